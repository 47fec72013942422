//! Hyperparameter values, combinations and grids.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::MlError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Float(f64),
    Int(usize),
    Text(String),
    None,
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::None => f.write_str("None"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Option<usize>> for ParamValue {
    fn from(v: Option<usize>) -> Self {
        v.map_or(Self::None, Self::Int)
    }
}

/// One concrete hyperparameter combination.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParamSet(pub BTreeMap<String, ParamValue>);

impl ParamSet {
    fn get(&self, name: &str) -> Result<&ParamValue, MlError> {
        self.0.get(name).ok_or_else(|| MlError::Param {
            name: name.to_string(),
            reason: "missing".into(),
        })
    }

    fn wrong(name: &str, want: &str, got: &ParamValue) -> MlError {
        MlError::Param {
            name: name.to_string(),
            reason: format!("expected {want}, got {got}"),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, MlError> {
        match self.get(name)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(Self::wrong(name, "a number", other)),
        }
    }

    pub fn usize(&self, name: &str) -> Result<usize, MlError> {
        match self.get(name)? {
            ParamValue::Int(v) => Ok(*v),
            other => Err(Self::wrong(name, "an integer", other)),
        }
    }

    /// An integer that may be `None`, e.g. an unlimited tree depth.
    pub fn opt_usize(&self, name: &str) -> Result<Option<usize>, MlError> {
        match self.get(name)? {
            ParamValue::Int(v) => Ok(Some(*v)),
            ParamValue::None => Ok(None),
            other => Err(Self::wrong(name, "an integer or None", other)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, MlError> {
        match self.get(name)? {
            ParamValue::Text(v) => Ok(v),
            other => Err(Self::wrong(name, "a string", other)),
        }
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Named value lists; expanded to their cartesian product.
#[derive(Debug, Clone, Default)]
pub struct ParamGrid(pub Vec<(&'static str, Vec<ParamValue>)>);

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, values: Vec<ParamValue>) -> Self {
        self.0.push((name, values));
        self
    }

    /// Number of combinations.
    pub fn size(&self) -> usize {
        self.0.iter().map(|(_, v)| v.len()).product()
    }

    /// Every combination, in declaration order with the last key varying fastest.
    pub fn expand(&self) -> Vec<ParamSet> {
        let mut out = vec![ParamSet::default()];
        for (name, values) in &self.0 {
            out = out
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |v| {
                        let mut next = base.clone();
                        next.0.insert((*name).to_string(), v.clone());
                        next
                    })
                })
                .collect();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_is_cartesian_last_fastest() {
        let grid = ParamGrid::new()
            .with("C", vec![0.1.into(), 1.0.into()])
            .with("kernel", vec!["linear".into(), "rbf".into(), "poly".into()]);
        let combos = grid.expand();
        assert_eq!(combos.len(), 6);
        assert_eq!(grid.size(), 6);
        assert_eq!(combos[0].text("kernel").unwrap(), "linear");
        assert_eq!(combos[1].text("kernel").unwrap(), "rbf");
        assert_eq!(combos[3].float("C").unwrap(), 1.0);
    }

    #[test]
    fn typed_getters() {
        let mut set = ParamSet::default();
        set.0.insert("max_depth".into(), None::<usize>.into());
        set.0.insert("n_estimators".into(), 100usize.into());
        assert_eq!(set.opt_usize("max_depth").unwrap(), None);
        assert_eq!(set.usize("n_estimators").unwrap(), 100);
        assert_eq!(set.float("n_estimators").unwrap(), 100.0);
        assert!(set.text("n_estimators").is_err());
        assert!(matches!(set.float("C"), Err(MlError::Param { .. })));
    }

    #[test]
    fn display_and_json() {
        let mut set = ParamSet::default();
        set.0.insert("C".into(), 10.0.into());
        set.0.insert("gamma".into(), "scale".into());
        assert_eq!(set.to_string(), "{C=10, gamma=scale}");
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["gamma"], "scale");
        assert_eq!(json["C"], 10.0);
    }

    #[test]
    fn empty_grid_is_one_empty_combo() {
        assert_eq!(ParamGrid::new().expand(), vec![ParamSet::default()]);
    }
}
