//! Mock Plugin
//!
//! Simulated components for running the container without hardware, and the
//! symbols that back the `redsun-mock` plugin manifest:
//!
//! | Symbol | Group |
//! |--------|-------|
//! | `redsun_mock.motor:MockMotor` | devices |
//! | `redsun_mock.motor:MotorInfo` | device info |
//! | `redsun_mock.detector:MockDetector` | devices (storage marker) |
//! | `redsun_mock.controller:StageController` | presenters |
//! | `redsun_mock.view:StageView` | views |
//!
//! # Example
//!
//! ```rust,ignore
//! let symbols = Arc::new(SymbolTable::new());
//! redsun::mock::register_symbols(&symbols);
//! let source = DirectoryPluginSource::with_paths(["plugins"]);
//! let resolver = ManifestResolver::new(Arc::new(source), symbols);
//! let mut container = Container::from_config(Path::new("config/mock_app.yaml"), &resolver)?;
//! container.build()?;
//! ```

use crate::bus::{Signal, VirtualBus};
use crate::di::DependencyContainer;
use crate::kwargs::Kwargs;
use crate::plugin::info::FieldsInfo;
use crate::plugin::symbols::SymbolTable;
use crate::protocols::{
    ClassRef, DataKey, Device, DeviceMap, HasShutdown, IsInjectable, IsProvider, Presenter, Reading, View,
};
use crate::storage::StorageSlot;
use anyhow::{anyhow, Context, Result};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Provider name under which [`StageController`] publishes stage positions.
pub const POSITIONS_PROVIDER: &str = "stage_positions";

/// Shared `motor/axis -> position` table.
pub type PositionTable = RwLock<BTreeMap<String, f64>>;

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

fn reading(value: serde_json::Value) -> Reading {
    Reading {
        value,
        timestamp: now(),
    }
}

fn data_key(dtype: &str, shape: Vec<usize>) -> DataKey {
    DataKey {
        source: "settings".to_string(),
        dtype: dtype.to_string(),
        shape,
    }
}

// =============================================================================
// MockMotor
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct MotorParams {
    egu: String,
    axis: Vec<String>,
    step_size: f64,
}

impl Default for MotorParams {
    fn default() -> Self {
        Self {
            egu: "mm".to_string(),
            axis: vec!["X".to_string()],
            step_size: 0.1,
        }
    }
}

/// Simulated multi-axis motor. Moves are instantaneous.
pub struct MockMotor {
    name: String,
    params: MotorParams,
    positions: RwLock<BTreeMap<String, f64>>,
}

impl MockMotor {
    /// Create a motor from its kwargs (`egu`, `axis`, `step_size`).
    pub fn new(name: &str, kwargs: &Kwargs) -> Result<Self> {
        let params: MotorParams = kwargs
            .extract()
            .with_context(|| format!("invalid parameters for motor '{}'", name))?;
        if params.axis.is_empty() {
            return Err(anyhow!("motor '{}' needs at least one axis", name));
        }
        let positions = params.axis.iter().map(|a| (a.clone(), 0.0)).collect();
        Ok(Self {
            name: name.to_string(),
            params,
            positions: RwLock::new(positions),
        })
    }

    /// Engineering units.
    pub fn egu(&self) -> &str {
        &self.params.egu
    }

    /// Axis names.
    pub fn axis(&self) -> &[String] {
        &self.params.axis
    }

    /// Current position of `axis`.
    pub fn position(&self, axis: &str) -> Option<f64> {
        self.positions.read().get(axis).copied()
    }

    /// Move `axis` to `target`.
    pub fn move_to(&self, axis: &str, target: f64) -> Result<()> {
        let mut positions = self.positions.write();
        let position = positions
            .get_mut(axis)
            .ok_or_else(|| anyhow!("motor '{}' has no axis '{}'", self.name, axis))?;
        *position = target;
        Ok(())
    }
}

impl Device for MockMotor {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_configuration(&self) -> BTreeMap<String, Reading> {
        BTreeMap::from([
            ("egu".to_string(), reading(json!(self.params.egu))),
            ("axis".to_string(), reading(json!(self.params.axis))),
            ("step_size".to_string(), reading(json!(self.params.step_size))),
        ])
    }

    fn describe_configuration(&self) -> BTreeMap<String, DataKey> {
        BTreeMap::from([
            ("egu".to_string(), data_key("string", vec![])),
            ("axis".to_string(), data_key("array", vec![self.params.axis.len()])),
            ("step_size".to_string(), data_key("number", vec![])),
        ])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// MockDetector
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct DetectorParams {
    exposure: f64,
    sensor_shape: Vec<usize>,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            exposure: 10.0,
            sensor_shape: vec![512, 512],
        }
    }
}

/// Simulated area detector. Carries the storage marker.
pub struct MockDetector {
    name: String,
    params: DetectorParams,
    storage: StorageSlot,
}

impl MockDetector {
    /// Create a detector from its kwargs (`exposure`, `sensor_shape`).
    pub fn new(name: &str, kwargs: &Kwargs) -> Result<Self> {
        let params: DetectorParams = kwargs
            .extract()
            .with_context(|| format!("invalid parameters for detector '{}'", name))?;
        Ok(Self {
            name: name.to_string(),
            params,
            storage: StorageSlot::new(),
        })
    }

    /// Exposure time in milliseconds.
    pub fn exposure(&self) -> f64 {
        self.params.exposure
    }

    /// Storage marker, with the writer attached once built in a container
    /// that has storage configured.
    pub fn storage(&self) -> &StorageSlot {
        &self.storage
    }
}

impl Device for MockDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_configuration(&self) -> BTreeMap<String, Reading> {
        BTreeMap::from([
            ("exposure".to_string(), reading(json!(self.params.exposure))),
            ("sensor_shape".to_string(), reading(json!(self.params.sensor_shape))),
        ])
    }

    fn describe_configuration(&self) -> BTreeMap<String, DataKey> {
        BTreeMap::from([
            ("exposure".to_string(), data_key("number", vec![])),
            ("sensor_shape".to_string(), data_key("array", vec![2])),
        ])
    }

    fn storage_slot(&mut self) -> Option<&mut StorageSlot> {
        Some(&mut self.storage)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// StageController
// =============================================================================

/// Presenter moving every [`MockMotor`] it receives and publishing the
/// resulting positions.
pub struct StageController {
    name: String,
    devices: DeviceMap,
    virtual_bus: Arc<VirtualBus>,
    positions: Arc<PositionTable>,
    moved: Signal<(String, f64)>,
}

impl StageController {
    /// Create the controller and register its `new_position` signal.
    pub fn new(name: &str, devices: &DeviceMap, virtual_bus: &Arc<VirtualBus>) -> Result<Self> {
        let moved = virtual_bus.register_signal(name, "new_position")?;
        let controller = Self {
            name: name.to_string(),
            devices: devices.clone(),
            virtual_bus: virtual_bus.clone(),
            positions: Arc::new(RwLock::new(BTreeMap::new())),
            moved,
        };
        controller.refresh();
        Ok(controller)
    }

    fn motors(&self) -> impl Iterator<Item = (&String, &MockMotor)> {
        self.devices
            .iter()
            .filter_map(|(name, device)| device.as_any().downcast_ref::<MockMotor>().map(|m| (name, m)))
    }

    fn refresh(&self) {
        let mut table = self.positions.write();
        for (name, motor) in self.motors() {
            for axis in motor.axis() {
                if let Some(position) = motor.position(axis) {
                    table.insert(format!("{}/{}", name, axis), position);
                }
            }
        }
    }

    /// Move `motor`'s `axis` and announce the new position on the bus.
    pub fn move_motor(&self, motor: &str, axis: &str, target: f64) -> Result<()> {
        let (_, device) = self
            .motors()
            .find(|(name, _)| name.as_str() == motor)
            .ok_or_else(|| anyhow!("no motor named '{}'", motor))?;
        device.move_to(axis, target)?;

        let key = format!("{}/{}", motor, axis);
        self.positions.write().insert(key.clone(), target);
        self.moved.emit((key, target));
        Ok(())
    }

    /// Names of the motors under control.
    pub fn motor_names(&self) -> Vec<String> {
        self.motors().map(|(name, _)| name.clone()).collect()
    }
}

impl Presenter for StageController {
    fn name(&self) -> &str {
        &self.name
    }

    fn devices(&self) -> &DeviceMap {
        &self.devices
    }

    fn virtual_bus(&self) -> &Arc<VirtualBus> {
        &self.virtual_bus
    }

    fn as_provider(&self) -> Option<&dyn IsProvider> {
        Some(self)
    }

    fn as_shutdown(&self) -> Option<&dyn HasShutdown> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl IsProvider for StageController {
    fn register_providers(&self, container: &DependencyContainer) -> Result<()> {
        container.register_object(POSITIONS_PROVIDER, self.positions.clone())?;
        Ok(())
    }
}

impl HasShutdown for StageController {
    fn shutdown(&self) -> Result<()> {
        // park every axis at the origin
        for (_, motor) in self.motors() {
            for axis in motor.axis() {
                motor.move_to(axis, 0.0)?;
            }
        }
        self.refresh();
        tracing::debug!("Stage controller '{}' parked {} motors", self.name, self.motor_names().len());
        Ok(())
    }
}

// =============================================================================
// StageView
// =============================================================================

/// Headless view over the position table published by [`StageController`].
pub struct StageView {
    name: String,
    virtual_bus: Arc<VirtualBus>,
    positions: Option<Arc<PositionTable>>,
}

impl StageView {
    /// Create the view. Positions become available after injection.
    pub fn new(name: &str, virtual_bus: &Arc<VirtualBus>) -> Self {
        Self {
            name: name.to_string(),
            virtual_bus: virtual_bus.clone(),
            positions: None,
        }
    }

    /// Snapshot of the published positions, empty before injection.
    pub fn positions(&self) -> BTreeMap<String, f64> {
        self.positions
            .as_ref()
            .map(|table| table.read().clone())
            .unwrap_or_default()
    }

    /// Whether the position provider was injected.
    pub fn is_connected(&self) -> bool {
        self.positions.is_some()
    }
}

impl View for StageView {
    fn name(&self) -> &str {
        &self.name
    }

    fn virtual_bus(&self) -> &Arc<VirtualBus> {
        &self.virtual_bus
    }

    fn as_injectable(&mut self) -> Option<&mut dyn IsInjectable> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl IsInjectable for StageView {
    fn inject_dependencies(&mut self, container: &Arc<DependencyContainer>) -> Result<()> {
        // running without a controller is allowed; the view stays empty
        self.positions = container.resolve::<PositionTable>(POSITIONS_PROVIDER);
        Ok(())
    }
}

// =============================================================================
// Classes
// =============================================================================

/// Class of [`MockMotor`].
pub fn motor_class() -> ClassRef {
    ClassRef::device("MockMotor", |name, kwargs| Ok(Box::new(MockMotor::new(name, kwargs)?)))
}

/// Class of [`MockDetector`].
pub fn detector_class() -> ClassRef {
    ClassRef::device("MockDetector", |name, kwargs| Ok(Box::new(MockDetector::new(name, kwargs)?)))
}

/// Class of [`StageController`].
pub fn controller_class() -> ClassRef {
    ClassRef::presenter("StageController", |name, devices, bus, _kwargs| {
        Ok(Box::new(StageController::new(name, devices, bus)?))
    })
}

/// Class of [`StageView`].
pub fn view_class() -> ClassRef {
    ClassRef::view("StageView", |name, bus, _kwargs| Ok(Box::new(StageView::new(name, bus))))
}

/// Register the `redsun-mock` symbols.
pub fn register_symbols(symbols: &SymbolTable) {
    symbols.register_class("redsun_mock.motor", "MockMotor", motor_class());
    symbols.register_class("redsun_mock.detector", "MockDetector", detector_class());
    symbols.register_class("redsun_mock.controller", "StageController", controller_class());
    symbols.register_class("redsun_mock.view", "StageView", view_class());
    symbols.register_info(
        "redsun_mock.motor",
        "MotorInfo",
        Arc::new(FieldsInfo::new("MotorInfo").require("axis")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_reads_kwargs() {
        let kwargs = Kwargs::new().with("egu", "um").with("axis", vec!["X", "Y"]);
        let motor = MockMotor::new("stage", &kwargs).unwrap();

        assert_eq!(motor.egu(), "um");
        assert_eq!(motor.position("Y"), Some(0.0));
        assert_eq!(motor.read_configuration()["egu"].value, json!("um"));
        assert_eq!(motor.describe_configuration()["axis"].shape, vec![2]);
    }

    #[test]
    fn motor_rejects_bad_kwargs() {
        assert!(MockMotor::new("m", &Kwargs::new().with("step_size", "fast")).is_err());
        assert!(MockMotor::new("m", &Kwargs::new().with("axis", Vec::<String>::new())).is_err());
    }

    #[test]
    fn controller_moves_and_announces() {
        let bus = Arc::new(VirtualBus::new());
        let motor: Arc<dyn Device> = Arc::new(MockMotor::new("stage", &Kwargs::new()).unwrap());
        let devices = DeviceMap::from([("stage".to_string(), motor)]);
        let controller = StageController::new("ctrl", &devices, &bus).unwrap();

        let mut rx = bus
            .signal::<(String, f64)>("ctrl", "new_position")
            .unwrap()
            .unwrap()
            .subscribe();
        controller.move_motor("stage", "X", 2.5).unwrap();

        assert_eq!(rx.try_recv().unwrap(), ("stage/X".to_string(), 2.5));
        assert!(controller.move_motor("stage", "Z", 1.0).is_err());
        assert!(controller.move_motor("other", "X", 1.0).is_err());
    }

    #[test]
    fn view_reads_injected_positions() {
        let bus = Arc::new(VirtualBus::new());
        let motor: Arc<dyn Device> = Arc::new(MockMotor::new("stage", &Kwargs::new()).unwrap());
        let devices = DeviceMap::from([("stage".to_string(), motor)]);
        let controller = StageController::new("ctrl", &devices, &bus).unwrap();

        let di = Arc::new(DependencyContainer::new(Kwargs::new()));
        controller.register_providers(&di).unwrap();

        let mut view = StageView::new("panel", &bus);
        assert!(!view.is_connected());
        view.inject_dependencies(&di).unwrap();
        controller.move_motor("stage", "X", 1.0).unwrap();

        assert_eq!(view.positions().get("stage/X"), Some(&1.0));
    }
}
