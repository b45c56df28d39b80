//! End-to-end tests: configuration file, plugin manifest, resolved and built container.

mod common;

use common::{mock_resolver, write_file};
use redsun::container::{Container, Frontend};
use redsun::error::{ConfigError, RedsunError};
use redsun::mock::{MockDetector, MockMotor, StageController, StageView};
use redsun::protocols::Group;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing_test::traced_test;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    write_file(dir.path(), "app.yaml", content)
}

#[test]
fn test_single_device_from_plugin() {
    let dir = TempDir::new().unwrap();
    let resolver = mock_resolver(dir.path());
    let config = write_config(
        &dir,
        r#"
schema_version: 1
frontend: pyqt
devices:
  stage:
    plugin_name: redsun-mock
    plugin_id: motor
    axis: [X, Y]
    egu: um
"#,
    );

    let mut container = Container::from_config(&config, &resolver).unwrap();
    assert_eq!(container.frontend(), Frontend::PyQt);
    assert_eq!(container.session(), "Redsun");

    let kwargs = container.device_components()[0].kwargs().clone();
    assert!(!kwargs.contains_key("plugin_name"));
    assert!(!kwargs.contains_key("plugin_id"));
    assert_eq!(kwargs.get_str("egu"), Some("um"));

    container.build().unwrap();
    let devices = container.devices().unwrap();
    assert_eq!(devices.keys().collect::<Vec<_>>(), vec!["stage"]);

    let motor = devices["stage"].as_any().downcast_ref::<MockMotor>().unwrap();
    assert_eq!(motor.egu(), "um");
    assert_eq!(motor.axis(), ["X".to_string(), "Y".to_string()]);
}

#[test]
fn test_full_mock_application() {
    let dir = TempDir::new().unwrap();
    let resolver = mock_resolver(dir.path());
    let stores = dir.path().join("stores");
    let config = write_config(
        &dir,
        &format!(
            r#"
schema_version: 1.0
session: bench
frontend: headless
storage:
  base_path: {}
devices:
  stage:
    plugin_name: redsun-mock
    plugin_id: motor
    axis: [X]
  camera:
    plugin_name: redsun-mock
    plugin_id: detector
    exposure: 5.0
presenters:
  ctrl:
    plugin_name: redsun-mock
    plugin_id: stage
views:
  panel:
    plugin_name: redsun-mock
    plugin_id: stage
"#,
            stores.display()
        ),
    );

    let mut container = Container::from_config(&config, &resolver).unwrap();
    container.build().unwrap();

    let devices = container.devices().unwrap();
    let camera = devices["camera"].as_any().downcast_ref::<MockDetector>().unwrap();
    assert_eq!(camera.exposure(), 5.0);
    assert!(camera.storage().is_attached());
    assert!(stores.is_dir());

    let presenters = container.presenters().unwrap();
    let ctrl = presenters["ctrl"].as_any().downcast_ref::<StageController>().unwrap();
    assert_eq!(ctrl.motor_names(), vec!["stage".to_string()]);
    ctrl.move_motor("stage", "X", 3.0).unwrap();

    let views = container.views().unwrap();
    let panel = views["panel"].as_any().downcast_ref::<StageView>().unwrap();
    assert!(panel.is_connected());
    assert_eq!(panel.positions().get("stage/X"), Some(&3.0));

    let info = container.plugin_info(Group::Devices).unwrap();
    assert_eq!(info["stage"].info_type, "MotorInfo");
    assert_eq!(info["camera"].info_type, "DeviceInfo");
    assert_eq!(info["stage"].plugin_id.as_deref(), Some("motor"));

    container.shutdown();
    let motor = devices["stage"].as_any().downcast_ref::<MockMotor>().unwrap();
    assert_eq!(motor.position("X"), Some(0.0));
}

#[test]
#[traced_test]
fn test_unresolvable_entries_are_skipped() {
    let dir = TempDir::new().unwrap();
    let resolver = mock_resolver(dir.path());
    let config = write_config(
        &dir,
        r#"
schema_version: 1.0
frontend: headless
devices:
  elsewhere:
    plugin_name: not-installed
    plugin_id: motor
  haunted:
    plugin_name: redsun-mock
    plugin_id: ghost
  unknown_id:
    plugin_name: redsun-mock
    plugin_id: laser
  no_id:
    plugin_name: redsun-mock
  no_axis:
    plugin_name: redsun-mock
    plugin_id: motor
  stage:
    plugin_name: redsun-mock
    plugin_id: motor
    axis: [X]
views:
  misplaced:
    plugin_name: redsun-mock
    plugin_id: motor
"#,
    );

    let mut container = Container::from_config(&config, &resolver).unwrap();
    let names: Vec<&str> = container.device_components().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["stage"]);
    assert!(container.view_components().is_empty());

    assert!(logs_contain("Plugin \"not-installed\" not found in the installed plugins."));
    assert!(logs_contain("refers to unknown class"));
    assert!(logs_contain("does not contain the id \"laser\""));
    assert!(logs_contain("does not name both plugin_name and plugin_id"));
    assert!(logs_contain("MotorInfo is missing fields: axis"));
    assert!(logs_contain("does not contain the id \"motor\""));

    container.build().unwrap();
    assert_eq!(container.devices().unwrap().len(), 1);
}

#[test]
fn test_unknown_frontend_is_fatal() {
    let dir = TempDir::new().unwrap();
    let resolver = mock_resolver(dir.path());
    let config = write_config(&dir, "schema_version: 1.0\nfrontend: tk\n");

    let err = Container::from_config(&config, &resolver).unwrap_err();
    assert!(matches!(
        err,
        RedsunError::Config(ConfigError::UnknownFrontend { ref frontend, .. }) if frontend == "tk"
    ));
}

#[test]
fn test_missing_required_keys_are_reported() {
    let dir = TempDir::new().unwrap();
    let resolver = mock_resolver(dir.path());
    let config = write_config(&dir, "session: bench\n");

    let err = Container::from_config(&config, &resolver).unwrap_err();
    assert!(matches!(err, RedsunError::Config(ConfigError::MissingKeys(ref keys)) if keys.len() == 2));
}

#[test]
fn test_missing_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let resolver = mock_resolver(dir.path());

    let err = Container::from_config(&dir.path().join("absent.yaml"), &resolver).unwrap_err();
    assert!(matches!(err, RedsunError::Config(ConfigError::NotFound(_))));
}

#[test]
fn test_shipped_mock_configuration_declares_every_group() {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let dir = TempDir::new().unwrap();
    let resolver = mock_resolver(dir.path());

    let container = Container::from_config(&root.join("config/mock_app.yaml"), &resolver).unwrap();
    assert_eq!(container.session(), "mock-bench");
    assert_eq!(container.device_components().len(), 2);
    assert_eq!(container.presenter_components().len(), 1);
    assert_eq!(container.view_components().len(), 1);
}
