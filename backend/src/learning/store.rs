use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{info, warn};

use super::WeightState;

/// Process-wide holder of the current `WeightState` snapshot.
pub struct WeightStore {
    current: RwLock<Arc<WeightState>>,
}

impl WeightStore {
    pub fn new(state: WeightState) -> Self {
        Self {
            current: RwLock::new(Arc::new(state)),
        }
    }

    /// The current snapshot. Cheap; later updates do not affect it.
    pub fn snapshot(&self) -> Arc<WeightState> {
        self.current.read().clone()
    }

    /// Copy the current state, apply `f`, and swap the result in.
    pub fn update<F>(&self, f: F) -> Arc<WeightState>
    where
        F: FnOnce(&mut WeightState),
    {
        let mut guard = self.current.write();
        let mut next = (**guard).clone();
        f(&mut next);
        let next = Arc::new(next);
        *guard = next.clone();
        next
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read weight state from {}", path.display()))?;
        let state: WeightState = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse weight state from {}", path.display()))?;
        info!(path = %path.display(), learning_rate = state.learning_rate, "weight state loaded");
        Ok(Self::new(state))
    }

    /// Load from `path`, or start from defaults with `learning_rate`.
    pub fn load_or_default(path: impl AsRef<Path>, learning_rate: f64) -> Self {
        match Self::load(path) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "using default weight state");
                Self::new(WeightState::with_learning_rate(learning_rate))
            }
        }
    }

    /// Atomic write (tmp + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json_atomic(path.as_ref(), &*self.snapshot())
    }
}

/// Serialize `value` to `path` through a sibling `.tmp` file.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("failed to serialise JSON")?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &content)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename {} to {}", tmp_path.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::FEATURE_FVG;

    #[test]
    fn snapshot_is_unaffected_by_later_updates() {
        let store = WeightStore::new(WeightState::default());
        let before = store.snapshot();
        store.update(|w| {
            w.feature_weights.insert(FEATURE_FVG.to_string(), 3.0);
        });
        assert_eq!(before.weight(FEATURE_FVG), 1.0);
        assert_eq!(store.snapshot().weight(FEATURE_FVG), 3.0);
    }

    #[test]
    fn save_and_reload_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weight_state.json");

        let store = WeightStore::new(WeightState::default());
        store.update(|w| w.learning_rate = 0.07);
        store.save(&path).unwrap();

        let reloaded = WeightStore::load(&path).unwrap();
        assert_eq!(*reloaded.snapshot(), *store.snapshot());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = WeightStore::load_or_default(dir.path().join("nope.json"), 0.02);
        assert_eq!(store.snapshot().learning_rate, 0.02);
        assert_eq!(store.snapshot().weight(FEATURE_FVG), 1.0);
    }
}
