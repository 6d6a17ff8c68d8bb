//! Instance queries and unguarded edits.

use super::types::InstanceView;
use crate::config::Settings;
use crate::error::Result;
use crate::registry::Registry;
use crate::validation::{validate_human_name, validate_instance_name};

pub fn list_instance_views(registry: &Registry, settings: &Settings) -> Vec<InstanceView> {
    registry
        .list_instances()
        .into_iter()
        .map(|instance| InstanceView::new(instance, settings))
        .collect()
}

pub fn get_instance_view(
    registry: &Registry,
    settings: &Settings,
    name: &str,
) -> Result<InstanceView> {
    validate_instance_name(name)?;
    let instance = registry.get_instance(name)?;
    Ok(InstanceView::new(instance, settings))
}

/// Change the display name. Touches no shared host resource, so it runs
/// without a guard.
pub fn update_human_name(
    registry: &Registry,
    settings: &Settings,
    name: &str,
    human_name: Option<String>,
) -> Result<InstanceView> {
    validate_instance_name(name)?;
    if let Some(human_name) = human_name.as_deref() {
        validate_human_name(human_name)?;
    }

    let instance = registry.modify_instance(name, |instance| instance.human_name = human_name)?;
    log::info!("Updated display name of instance {}", name);
    Ok(InstanceView::new(instance, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::Instance;

    fn open_temp() -> (tempfile::TempDir, Registry, Settings) {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::defaults_for(dir.path());
        let registry = Registry::open(dir.path().join("state.json"), settings.clone()).unwrap();
        (dir, registry, settings)
    }

    #[test]
    fn view_carries_public_url() {
        let (_dir, registry, settings) = open_temp();
        registry
            .add_instance(Instance::new("bla", "blaold", 9000, None))
            .unwrap();
        let view = get_instance_view(&registry, &settings, "bla").unwrap();
        assert_eq!(view.public_url, "http://localhost/blaold/");
    }

    #[test]
    fn human_name_can_be_set_and_cleared() {
        let (_dir, registry, settings) = open_temp();
        registry
            .add_instance(Instance::new("bla", "blaold", 9000, None))
            .unwrap();

        let view =
            update_human_name(&registry, &settings, "bla", Some("Blackfoot OLD".to_string()))
                .unwrap();
        assert_eq!(view.instance.human_name.as_deref(), Some("Blackfoot OLD"));

        let view = update_human_name(&registry, &settings, "bla", None).unwrap();
        assert_eq!(view.instance.human_name, None);
    }

    #[test]
    fn blank_human_name_is_rejected() {
        let (_dir, registry, settings) = open_temp();
        registry
            .add_instance(Instance::new("bla", "blaold", 9000, None))
            .unwrap();
        let err = update_human_name(&registry, &settings, "bla", Some("  ".to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
