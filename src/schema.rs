//! Task and value naming plus per-value decimal precision.
//!
//! The export engine only sees the [`TaskSchema`] trait. [`SchemaRegistry`]
//! is the stock implementation, loaded from a JSON document:
//!
//! ```json
//! {
//!   "max_tasks": 12,
//!   "tasks": [
//!     { "name": "bme", "plugin_id": 28,
//!       "values": [ { "name": "temp", "decimals": 2 }, { "name": "hum", "decimals": 1 } ] }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result, VARS_PER_TASK};

/// Default number of task slots.
pub const DEFAULT_MAX_TASKS: usize = 32;

/// Decimals used for values without an explicit setting.
pub const DEFAULT_DECIMALS: u8 = 2;

/// Plugin ID 0 marks a task slot with no device configured.
pub const INVALID_PLUGIN_ID: u16 = 0;

pub trait TaskSchema {
    /// Number of task slots, configured or not.
    fn task_count(&self) -> usize;

    /// Task name; empty for unnamed tasks.
    fn task_name(&self, task: usize) -> String;

    /// Value name; empty when unset.
    fn value_name(&self, task: usize, slot: usize) -> String;

    fn value_decimals(&self, task: usize, slot: usize) -> u8;

    /// Plugin driving the task, `None` when the slot is unconfigured.
    fn plugin_id(&self, task: usize) -> Option<u16>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub plugin_id: Option<u16>,
    #[serde(default)]
    pub values: Vec<ValueConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueConfig {
    pub name: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_max_tasks() -> usize {
    DEFAULT_MAX_TASKS
}

fn default_decimals() -> u8 {
    DEFAULT_DECIMALS
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            tasks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    config: SchemaConfig,
}

impl SchemaRegistry {
    pub fn new(config: SchemaConfig) -> Result<Self> {
        if config.max_tasks > usize::from(u8::MAX) + 1 {
            return Err(Error::InvalidConfig(format!(
                "max_tasks {} exceeds the 256 addressable task slots",
                config.max_tasks
            )));
        }
        if config.tasks.len() > config.max_tasks {
            return Err(Error::InvalidConfig(format!(
                "{} tasks configured but max_tasks is {}",
                config.tasks.len(),
                config.max_tasks
            )));
        }
        if let Some((index, task)) = config
            .tasks
            .iter()
            .enumerate()
            .find(|(_, task)| task.values.len() > VARS_PER_TASK)
        {
            return Err(Error::InvalidConfig(format!(
                "task {index} ({}) has {} values, at most {VARS_PER_TASK} allowed",
                task.name,
                task.values.len()
            )));
        }
        Ok(Self { config })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::new(serde_json::from_str(&text)?)
    }

    fn value(&self, task: usize, slot: usize) -> Option<&ValueConfig> {
        self.config.tasks.get(task)?.values.get(slot)
    }
}

impl TaskSchema for SchemaRegistry {
    fn task_count(&self) -> usize {
        self.config.max_tasks
    }

    fn task_name(&self, task: usize) -> String {
        self.config
            .tasks
            .get(task)
            .map(|task| task.name.clone())
            .unwrap_or_default()
    }

    fn value_name(&self, task: usize, slot: usize) -> String {
        self.value(task, slot)
            .map(|value| value.name.clone())
            .unwrap_or_default()
    }

    fn value_decimals(&self, task: usize, slot: usize) -> u8 {
        self.value(task, slot)
            .map_or(DEFAULT_DECIMALS, |value| value.decimals)
    }

    fn plugin_id(&self, task: usize) -> Option<u16> {
        self.config
            .tasks
            .get(task)?
            .plugin_id
            .filter(|&id| id != INVALID_PLUGIN_ID)
    }
}

/// Decimal digits per (task, value slot), materialized once per export pass.
#[derive(Debug, Clone)]
pub struct DecimalPrecisionTable {
    decimals: Vec<u8>,
}

impl DecimalPrecisionTable {
    pub fn from_schema(schema: &dyn TaskSchema) -> Self {
        let decimals = (0..schema.task_count() * VARS_PER_TASK)
            .map(|index| schema.value_decimals(index / VARS_PER_TASK, index % VARS_PER_TASK))
            .collect();
        Self { decimals }
    }

    pub fn get(&self, task: usize, slot: usize) -> u8 {
        self.decimals
            .get(task * VARS_PER_TASK + slot)
            .copied()
            .unwrap_or(DEFAULT_DECIMALS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SchemaRegistry {
        let config: SchemaConfig = serde_json::from_str(
            r#"{
                "max_tasks": 3,
                "tasks": [
                    { "name": "bme", "plugin_id": 28,
                      "values": [ { "name": "temp", "decimals": 1 }, { "name": "hum" } ] },
                    { "name": "off", "plugin_id": 0 }
                ]
            }"#,
        )
        .unwrap();
        SchemaRegistry::new(config).unwrap()
    }

    #[test]
    fn names_default_to_empty() {
        let schema = registry();
        assert_eq!(schema.task_count(), 3);
        assert_eq!(schema.task_name(0), "bme");
        assert_eq!(schema.value_name(0, 1), "hum");
        assert_eq!(schema.value_name(0, 3), "");
        assert_eq!(schema.task_name(2), "");
    }

    #[test]
    fn zero_plugin_id_is_unconfigured() {
        let schema = registry();
        assert_eq!(schema.plugin_id(0), Some(28));
        assert_eq!(schema.plugin_id(1), None);
        assert_eq!(schema.plugin_id(2), None);
    }

    #[test]
    fn precision_table_follows_schema() {
        let table = DecimalPrecisionTable::from_schema(&registry());
        assert_eq!(table.get(0, 0), 1);
        assert_eq!(table.get(0, 1), DEFAULT_DECIMALS);
        assert_eq!(table.get(2, 3), DEFAULT_DECIMALS);
    }

    #[test]
    fn rejects_too_many_values() {
        let config = SchemaConfig {
            max_tasks: 1,
            tasks: vec![TaskConfig {
                name: "wide".into(),
                plugin_id: Some(1),
                values: (0..5)
                    .map(|i| ValueConfig {
                        name: format!("v{i}"),
                        decimals: 0,
                    })
                    .collect(),
            }],
        };
        assert!(matches!(
            SchemaRegistry::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
