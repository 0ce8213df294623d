use std::rc::Rc;

use serde_json::Value;

use crate::class::{Extend, Output, WidgetClass};
use crate::dom::VElement;
use crate::error::ClassError;
use crate::page::{reflect_attr, text_of};

/// Widgets with a text label, shown in their `label` part.
pub fn labeled_class(element: &Rc<WidgetClass>) -> Result<Rc<WidgetClass>, ClassError> {
    element
        .extend("Labeled")
        .state("label", Value::String(String::new()))
        .method("s_label", |page, id, args| {
            let text = text_of(args.first().unwrap_or(&Value::Null));
            let widget = page.widget(id)?;
            if let Some(node) = widget.part("label").or(widget.node()) {
                page.document_mut().set_text(node, &text);
            }
            Ok(Output::none())
        })
        .build()
}

pub fn button_class(labeled: &Rc<WidgetClass>) -> Result<Rc<WidgetClass>, ClassError> {
    labeled
        .extend("Button")
        .state("disabled", Value::Bool(false))
        .method("render", |_, _, _| {
            Ok(Output::Node(
                VElement::new("button")
                    .class("button")
                    .child(VElement::new("span").part("label"))
                    .into(),
            ))
        })
        .method("s_disabled", |page, id, args| {
            reflect_attr(page, id, "disabled", args.first().unwrap_or(&Value::Null))?;
            Ok(Output::none())
        })
        .build()
}
