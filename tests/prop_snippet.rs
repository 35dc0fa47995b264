//! Property tests for the value excerpt in wrong-type messages.
use proptest::prelude::*;
use typed_yaml::{new_wrong_type_error, NodeTree, Tag, TypeDescriptor};

fn scalar_tag() -> impl Strategy<Value = Tag> {
    prop_oneof![
        Just(Tag::Str),
        Just(Tag::Int),
        Just(Tag::Float),
        Just(Tag::Bool),
        Just(Tag::Null),
    ]
}

fn wrong_type_message(tag: Tag, value: &str, target: &TypeDescriptor) -> String {
    let mut tree = NodeTree::new();
    tree.push(None, tag, value, 7, 1);
    let node = tree.root().unwrap();
    new_wrong_type_error("wrong type", node, target).to_string()
}

proptest! {
    #[test]
    fn short_values_appear_in_full(tag in scalar_tag(), value in "\\PC{0,10}") {
        let target = TypeDescriptor::sequence(TypeDescriptor::int());
        let message = wrong_type_message(tag, &value, &target);
        prop_assert_eq!(
            message,
            format!("line 7: cannot unmarshal {} `{}` into []int", tag.short(), value)
        );
    }

    #[test]
    fn long_values_keep_seven_characters(tag in scalar_tag(), value in "\\PC{11,40}") {
        let target = TypeDescriptor::int();
        let message = wrong_type_message(tag, &value, &target);
        let head: String = value.chars().take(7).collect();
        prop_assert_eq!(
            message,
            format!("line 7: cannot unmarshal {} `{}...` into int", tag.short(), head)
        );
    }

    #[test]
    fn containers_never_show_a_value(
        tag in prop_oneof![Just(Tag::Seq), Just(Tag::Map)],
        value in "\\PC{0,20}",
    ) {
        let target = TypeDescriptor::string();
        let message = wrong_type_message(tag, &value, &target);
        prop_assert_eq!(
            message,
            format!("line 7: cannot unmarshal {} into string", tag.short())
        );
    }
}
