use std::rc::Rc;

use crate::class::{Extend, Output, WidgetClass};
use crate::dom::VElement;
use crate::error::ClassError;

/// Plain container; children go straight under its root node.
pub fn panel_class(element: &Rc<WidgetClass>) -> Result<Rc<WidgetClass>, ClassError> {
    element
        .extend("Panel")
        .container(true)
        .method("render", |_, _, _| {
            Ok(Output::Node(VElement::new("div").class("panel").anchor().into()))
        })
        .build()
}
