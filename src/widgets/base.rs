use std::rc::Rc;

use serde_json::Value;

use crate::class::{Extend, Output, WidgetClass};
use crate::error::{ClassError, Fault};
use crate::page::{Page, bool_arg, reflect_attr, str_arg, text_of};

/// Root of every widget class. Has no `render`, so it cannot be shown.
pub fn base_class() -> Result<Rc<WidgetClass>, ClassError> {
    WidgetClass::root("Base")
        .method("destroy", |page, id, _| {
            page.destroy(id)?;
            Ok(Output::none())
        })
        .method("rerender", |page, id, _| {
            page.rerender(id)?;
            Ok(Output::none())
        })
        .method("add", add)
        .method("remove", remove)
        .method("forward", forward)
        .method("trackVisibility", |page, id, _| {
            page.track_visibility(id)?;
            Ok(Output::none())
        })
        .method("getState", |page, id, args| {
            let key = str_arg(args, 0, "getState")?;
            Ok(Output::Value(page.get_state(id, key)?))
        })
        .method("sync", sync)
        .method("find", |page, id, args| {
            let name = str_arg(args, 0, "find")?;
            Ok(Output::Value(page.find_by_name(id, name).map_or(Value::Null, Value::String)))
        })
        .build()
}

/// `add [child, index?]`
fn add(page: &mut Page, id: &str, args: &[Value]) -> Result<Output, Fault> {
    let child = str_arg(args, 0, "add")?.to_string();
    let index = args.get(1).and_then(Value::as_u64).map(|i| i as usize);
    page.add_child(id, &child, index)?;
    Ok(Output::none())
}

/// `remove [child, destroy = true]`
fn remove(page: &mut Page, id: &str, args: &[Value]) -> Result<Output, Fault> {
    let child = str_arg(args, 0, "remove")?.to_string();
    let destroy = args.get(1).and_then(Value::as_bool).unwrap_or(true);
    page.remove_child(id, &child, destroy)?;
    Ok(Output::none())
}

/// `forward [type, enabled = true]`
fn forward(page: &mut Page, id: &str, args: &[Value]) -> Result<Output, Fault> {
    let kind = str_arg(args, 0, "forward")?.to_string();
    let enabled = match args.get(1) {
        None | Some(Value::Null) => true,
        Some(_) => bool_arg(args, 1, "forward")?,
    };
    page.forward_to_server(id, &kind, enabled)?;
    Ok(Output::none())
}

/// `sync [keys?]`
fn sync(page: &mut Page, id: &str, args: &[Value]) -> Result<Output, Fault> {
    match args.first() {
        Some(Value::Array(keys)) => {
            let keys: Vec<String> = keys
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            page.sync_state(id, Some(&keys))?;
        }
        _ => page.sync_state(id, None)?,
    }
    Ok(Output::none())
}

/// Anything with a primary node: visibility, extra classes, focus.
pub fn element_class(base: &Rc<WidgetClass>) -> Result<Rc<WidgetClass>, ClassError> {
    base.extend("Element")
        .state("visible", Value::Bool(true))
        .state("cls", Value::String(String::new()))
        .method("s_visible", |page, id, args| {
            let visible = args.first().and_then(Value::as_bool).unwrap_or(true);
            reflect_attr(page, id, "hidden", &Value::Bool(!visible))?;
            Ok(Output::none())
        })
        .method("s_cls", |page, id, args| {
            let Some(node) = page.node_of(id) else {
                return Ok(Output::none());
            };
            let old = text_of(args.get(1).unwrap_or(&Value::Null));
            let new = text_of(args.first().unwrap_or(&Value::Null));
            let document = page.document_mut();
            for class in old.split_whitespace() {
                document.remove_class(node, class);
            }
            for class in new.split_whitespace() {
                document.add_class(node, class);
            }
            Ok(Output::none())
        })
        .method("focus", |page, id, _| {
            if let Some(node) = page.node_of(id) {
                page.document_mut().focus(node);
            }
            Ok(Output::none())
        })
        .method("closePopups", |page, id, _| {
            Ok(Output::Value(Value::from(page.close_popup(id))))
        })
        .build()
}
