// Built-in Widget Classes
// The generic hierarchy every page starts with, registered under the
// `core` module: Base -> Element -> (Labeled -> Button | Panel | Text | Input).

pub mod base;
pub mod input;
pub mod labeled;
pub mod panel;
pub mod text;

use crate::class::ClassTable;
use crate::error::ClassError;
use crate::page::DEFAULT_MODULE;

/// Register the built-in classes into `table`.
pub fn register_builtins(table: &mut ClassTable) -> Result<(), ClassError> {
    let base = base::base_class()?;
    let element = base::element_class(&base)?;
    let labeled = labeled::labeled_class(&element)?;

    table.register(DEFAULT_MODULE, labeled::button_class(&labeled)?);
    table.register(DEFAULT_MODULE, panel::panel_class(&element)?);
    table.register(DEFAULT_MODULE, text::text_class(&element)?);
    table.register(DEFAULT_MODULE, input::input_class(&element)?);
    table.register(DEFAULT_MODULE, labeled);
    table.register(DEFAULT_MODULE, element);
    table.register(DEFAULT_MODULE, base);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_register_cleanly() {
        let mut table = ClassTable::new();
        register_builtins(&mut table).unwrap();
        assert_eq!(table.len(), 7);

        let button = table.get(DEFAULT_MODULE, "Button").unwrap();
        assert!(button.is_a("Labeled"));
        assert!(button.is_a("Element"));
        assert!(button.is_a("Base"));
        assert!(button.warnings().is_empty());
        assert!(table.get(DEFAULT_MODULE, "Panel").unwrap().is_container());
    }
}
