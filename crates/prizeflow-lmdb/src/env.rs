use lmdb::{Environment, EnvironmentFlags};
use prizeflow_core::{
    config::{EnvTuning, SyncMode},
    PrizeError, Result,
};
use std::path::Path;

/// Open (creating if needed) an LMDB environment directory
pub(crate) fn open_env(path: &Path, tuning: &EnvTuning, max_dbs: u32) -> Result<Environment> {
    std::fs::create_dir_all(path)?;

    let mut env_builder = Environment::new();
    env_builder.set_max_dbs(max_dbs);
    env_builder.set_map_size(tuning.map_size);
    env_builder.set_max_readers(tuning.max_readers);

    let mut flags = EnvironmentFlags::empty();
    match tuning.sync_mode {
        SyncMode::Full => {}
        SyncMode::NoMetaSync => {
            flags.insert(EnvironmentFlags::NO_META_SYNC);
        }
        SyncMode::NoSync => {
            flags.insert(EnvironmentFlags::NO_SYNC);
        }
    }
    env_builder.set_flags(flags);

    env_builder.open(path).map_err(|e| {
        PrizeError::StoreUnavailable(format!(
            "failed to open LMDB environment at {}: {}",
            path.display(),
            e
        ))
    })
}

pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
