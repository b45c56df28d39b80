//! Keyword-argument merging.
//!
//! A component's final constructor kwargs come from up to three layers,
//! lowest precedence first:
//!
//! 1. plugin defaults (the class's own defaults),
//! 2. the component's entry in the configuration file,
//! 3. kwargs declared inline with the component.
//!
//! A key present in a higher layer replaces the lower one entirely; values
//! are not merged recursively.

use crate::kwargs::Kwargs;
use tracing::warn;

/// Overlay `declared` on the config entry for `component_name`.
///
/// When the configuration has no entry for the component, the declared
/// kwargs are used as they are and a warning is logged.
pub fn merge(component_name: &str, declared: &Kwargs, section: Option<&Kwargs>) -> Kwargs {
    match section {
        Some(section) => {
            let mut merged = section.clone();
            merged.overlay(declared);
            merged
        }
        None => {
            warn!(
                "Component '{}' takes its configuration from the config file, but the file has no entry for it",
                component_name
            );
            declared.clone()
        }
    }
}

/// Merge all three layers.
pub fn merge_layers(defaults: &Kwargs, section: Option<&Kwargs>, declared: &Kwargs) -> Kwargs {
    let mut merged = defaults.clone();
    if let Some(section) = section {
        merged.overlay(section);
    }
    merged.overlay(declared);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn inline_wins_over_config() {
        let section = Kwargs::new().with("egu", "mm").with("axis", vec!["X"]);
        let declared = Kwargs::new().with("egu", "um");

        let merged = merge("motor", &declared, Some(&section));
        assert_eq!(merged.get_str("egu"), Some("um"));
        assert!(merged.contains_key("axis"));
    }

    #[test]
    #[traced_test]
    fn missing_section_warns_and_keeps_declared() {
        let declared = Kwargs::new().with("egu", "um");
        let merged = merge("motor", &declared, None);

        assert_eq!(merged, declared);
        assert!(logs_contain("Component 'motor' takes its configuration from the config file"));
    }

    #[test]
    fn three_layers_in_precedence_order() {
        let defaults = Kwargs::new().with("egu", "m").with("step", 1).with("axis", vec!["X"]);
        let section = Kwargs::new().with("egu", "mm").with("step", 2);
        let declared = Kwargs::new().with("egu", "um");

        let merged = merge_layers(&defaults, Some(&section), &declared);
        assert_eq!(merged.get_str("egu"), Some("um"));
        assert_eq!(merged.get("step"), Some(&serde_yaml::Value::from(2)));
        assert!(merged.contains_key("axis"));
    }
}
