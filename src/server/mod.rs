//! The server façade: configuration, registries, drives and runtime state,
//! as exposed to the command handlers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::{bail, format_err, Error};
use tokio::sync::Semaphore;

use lily_api_types::Clearance;
use lily_config::{log_level_from_str, ServerConfig, UserRegistry};
use lily_datastore::{Drive, FsError};

use crate::session::SessionRegistry;
use crate::LilyError;

pub mod connection;
pub mod cron;
pub mod state;

pub use state::{catch_shutdown_signal, ShutdownState};

/// Settings an administrator can adjust at runtime without a restart.
struct RuntimeSettings {
    network_timeout: Duration,
    workers: Arc<Semaphore>,
    num_workers: usize,
}

pub struct Server {
    pub config: ServerConfig,
    pub users: UserRegistry,
    pub sessions: SessionRegistry,
    pub state: ShutdownState,
    drives: RwLock<HashMap<String, Arc<Drive>>>,
    settings: RwLock<RuntimeSettings>,
    started: Instant,
}

impl Server {
    /// Load users and drives and assemble the façade. A missing users file
    /// bootstraps the configured administrator account.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, Error> {
        config.validate()?;

        let users = UserRegistry::load(&config.users_file)?;
        if users.is_empty() {
            match (&config.admin_user, &config.admin_password) {
                (Some(name), Some(password)) => {
                    users
                        .create(name, password, Clearance::Level5)
                        .map_err(|err| format_err!("unable to bootstrap admin - {}", err))?;
                    users.save(&config.users_file)?;
                    log::info!("bootstrapped administrator account '{}'", name);
                }
                _ => bail!(
                    "users file {:?} is empty and no bootstrap admin is configured",
                    config.users_file
                ),
            }
        }

        let mut drives = HashMap::new();
        for drive_config in &config.drives {
            let drive = Drive::open(
                &drive_config.name,
                drive_config.dir.clone(),
                drive_config.file.clone(),
            )
            .map_err(|err| format_err!("unable to open drive '{}' - {}", drive_config.name, err))?;
            log::info!("opened drive '{}' at {:?}", drive_config.name, drive_config.dir);
            drives.insert(drive_config.name.clone(), Arc::new(drive));
        }

        let settings = RuntimeSettings {
            network_timeout: config.network_timeout(),
            workers: Arc::new(Semaphore::new(config.num_workers)),
            num_workers: config.num_workers,
        };

        Ok(Arc::new(Self {
            users,
            sessions: SessionRegistry::new(config.session.clone()),
            state: ShutdownState::new(),
            drives: RwLock::new(drives),
            settings: RwLock::new(settings),
            started: Instant::now(),
            config,
        }))
    }

    /// Look up a drive. The map lock is held for the lookup only; the
    /// caller operates on the returned handle under the drive's own locks.
    pub fn drive(&self, name: &str) -> Result<Arc<Drive>, LilyError> {
        self.drives
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| LilyError::NoSuchDrive(name.to_string()))
    }

    pub fn drive_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drives.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn drive_handles(&self) -> Vec<Arc<Drive>> {
        self.drives.read().unwrap().values().cloned().collect()
    }

    pub fn create_drive(
        &self,
        name: &str,
        dir: PathBuf,
        file: PathBuf,
    ) -> Result<(), LilyError> {
        let mut drives = self.drives.write().unwrap();
        if drives.contains_key(name) {
            return Err(LilyError::DriveExists(name.to_string()));
        }
        let drive = Drive::create(name, dir, file).map_err(LilyError::Fs)?;
        drives.insert(name.to_string(), Arc::new(drive));
        Ok(())
    }

    /// Drive-level operations block the whole drive: the write side of the
    /// drive lock waits out every in-flight operation first.
    pub async fn rename_drive(&self, name: &str, new_name: &str) -> Result<(), LilyError> {
        lily_datastore::validate_node_name(new_name).map_err(LilyError::Fs)?;

        let drive = {
            let drives = self.drives.read().unwrap();
            if drives.contains_key(new_name) {
                return Err(LilyError::DriveExists(new_name.to_string()));
            }
            drives
                .get(name)
                .cloned()
                .ok_or_else(|| LilyError::NoSuchDrive(name.to_string()))?
        };

        let _guard = drive.admin_lock().write().await;

        let mut drives = self.drives.write().unwrap();
        if drives.contains_key(new_name) {
            return Err(LilyError::DriveExists(new_name.to_string()));
        }
        let drive = drives
            .remove(name)
            .ok_or_else(|| LilyError::NoSuchDrive(name.to_string()))?;
        drive.set_name(new_name).map_err(LilyError::Fs)?;
        drives.insert(new_name.to_string(), drive);
        Ok(())
    }

    /// Detach a drive from the server and delete its snapshot file. The
    /// backing directory and its data are left on disk.
    pub async fn delete_drive(&self, name: &str) -> Result<(), LilyError> {
        let drive = self
            .drives
            .write()
            .unwrap()
            .remove(name)
            .ok_or_else(|| LilyError::NoSuchDrive(name.to_string()))?;

        // wait for in-flight operations to finish
        let _guard = drive.admin_lock().write().await;

        if let Err(err) = std::fs::remove_file(drive.snapshot_file()) {
            if err.kind() != std::io::ErrorKind::NotFound {
                return Err(LilyError::Fs(FsError::Io(err)));
            }
        }
        Ok(())
    }

    pub fn network_timeout(&self) -> Duration {
        self.settings.read().unwrap().network_timeout
    }

    pub fn set_network_timeout(&self, timeout: Duration) -> Result<(), LilyError> {
        if timeout.is_zero() {
            return Err(LilyError::InvalidTimeout);
        }
        self.settings.write().unwrap().network_timeout = timeout;
        Ok(())
    }

    pub fn chunk_idle_timeout(&self) -> Duration {
        self.config.chunk_idle_timeout()
    }

    pub fn num_workers(&self) -> usize {
        self.settings.read().unwrap().num_workers
    }

    pub fn worker_pool(&self) -> Arc<Semaphore> {
        self.settings.read().unwrap().workers.clone()
    }

    /// Resize the worker pool. Connections already holding a permit finish
    /// on the old pool; new connections draw from the new one.
    pub fn set_num_workers(&self, count: i64) -> Result<(), LilyError> {
        if count < 1 {
            return Err(LilyError::InvalidNumWorkers(count));
        }
        let mut settings = self.settings.write().unwrap();
        settings.num_workers = count as usize;
        settings.workers = Arc::new(Semaphore::new(count as usize));
        Ok(())
    }

    pub fn set_log_level(&self, name: &str) -> Result<(), LilyError> {
        let level =
            log_level_from_str(name).ok_or_else(|| LilyError::InvalidLogLevel(name.to_string()))?;
        log::set_max_level(level);
        log::info!("log level set to {}", level);
        Ok(())
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Resident set size of the server process in bytes, from
    /// `/proc/self/status`.
    pub fn memory_usage(&self) -> Result<u64, Error> {
        let status = std::fs::read_to_string("/proc/self/status")?;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                let kib: u64 = rest
                    .trim()
                    .trim_end_matches("kB")
                    .trim()
                    .parse()
                    .map_err(|_| format_err!("malformed VmRSS line in /proc/self/status"))?;
                return Ok(kib * 1024);
            }
        }
        bail!("no VmRSS line in /proc/self/status");
    }
}
