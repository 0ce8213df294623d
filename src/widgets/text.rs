use std::rc::Rc;

use serde_json::Value;

use crate::class::{Extend, Output, WidgetClass};
use crate::dom::VElement;
use crate::error::ClassError;
use crate::page::text_of;

pub fn text_class(element: &Rc<WidgetClass>) -> Result<Rc<WidgetClass>, ClassError> {
    element
        .extend("Text")
        .state("text", Value::String(String::new()))
        .method("render", |_, _, _| {
            Ok(Output::Node(VElement::new("span").class("text").into()))
        })
        .method("s_text", |page, id, args| {
            let text = text_of(args.first().unwrap_or(&Value::Null));
            if let Some(node) = page.node_of(id) {
                page.document_mut().set_text(node, &text);
            }
            Ok(Output::none())
        })
        .build()
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use crate::testing::{page_with, props};

    #[test]
    fn test_text_follows_state() {
        let (mut page, _rx) = page_with(|_| {});
        let id = page.create(None, props("Text"), Map::new()).unwrap();
        let node = page.node_of(&id).unwrap();
        assert_eq!(page.document().text_content(node), "");

        page.update_state(&id, "text", json!(42), true).unwrap();
        assert_eq!(page.document().text_content(node), "42");
    }
}
