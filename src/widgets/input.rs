use std::rc::Rc;

use serde_json::Value;

use crate::class::{Extend, Output, WidgetClass};
use crate::dom::VElement;
use crate::error::ClassError;
use crate::page::text_of;

/// Single-line text field. Typing updates `value` locally, which raises
/// `statechange` for the server.
pub fn input_class(element: &Rc<WidgetClass>) -> Result<Rc<WidgetClass>, ClassError> {
    element
        .extend("Input")
        .state("value", Value::String(String::new()))
        .state("placeholder", Value::String(String::new()))
        .method("render", |_, _, _| {
            Ok(Output::Node(
                VElement::new("div")
                    .class("input")
                    .child(VElement::new("input").attr("type", "text").part("input"))
                    .into(),
            ))
        })
        .method("after_attach", |page, id, _| {
            page.listen(id, "input")?;
            Ok(Output::none())
        })
        .method("s_value", |page, id, args| {
            let value = text_of(args.first().unwrap_or(&Value::Null));
            let input = page.widget(id)?.part("input");
            if let Some(input) = input {
                page.document_mut().set_attr(input, "value", &value);
            }
            Ok(Output::none())
        })
        .method("s_placeholder", |page, id, args| {
            let text = text_of(args.first().unwrap_or(&Value::Null));
            let input = page.widget(id)?.part("input");
            if let Some(input) = input {
                if text.is_empty() {
                    page.document_mut().remove_attr(input, "placeholder");
                } else {
                    page.document_mut().set_attr(input, "placeholder", &text);
                }
            }
            Ok(Output::none())
        })
        .method("on_input", |page, id, _| {
            let Some(input) = page.widget(id)?.part("input") else {
                return Ok(Output::none());
            };
            let value = page.document().attr(input, "value").unwrap_or_default().to_string();
            page.update_state(id, "value", Value::String(value), false)?;
            Ok(Output::none())
        })
        .method_with_super("focus", |page, id, _| {
            let input = page.widget(id)?.part("input");
            match input {
                Some(input) => {
                    page.document_mut().focus(input);
                    Ok(Output::none())
                }
                None => page.call_super(id, None),
            }
        })
        .build()
}
