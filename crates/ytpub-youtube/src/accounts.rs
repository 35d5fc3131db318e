//! Multi-account balancing across YouTube channels.
//!
//! Accounts and chat bindings live in `accounts.json`; per-day usage lives in
//! `quota_usage.json` next to it. Usage counters are keyed by date and reset
//! implicitly when the stored date is not today.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::credentials::{CredentialProvider, Credentials, YOUTUBE_SCOPES};
use crate::error::{YoutubeError, YoutubeResult};

/// API units charged for one `videos.insert`.
pub const UPLOAD_API_COST: u64 = 1600;

const ACCOUNTS_FILE: &str = "accounts.json";
const USAGE_FILE: &str = "quota_usage.json";

fn default_quota_limit() -> u64 {
    10_000
}

fn default_upload_limit() -> u32 {
    6
}

fn default_enabled() -> bool {
    true
}

/// One YouTube channel the worker may upload to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoutubeAccount {
    pub account_id: String,
    pub name: String,
    #[serde(default)]
    pub channel_id: String,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    #[serde(default = "default_quota_limit")]
    pub daily_quota_limit: u64,
    #[serde(default = "default_upload_limit")]
    pub daily_upload_limit: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl YoutubeAccount {
    pub fn new(
        account_id: impl Into<String>,
        name: impl Into<String>,
        credentials_path: impl Into<PathBuf>,
        token_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
            channel_id: String::new(),
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
            daily_quota_limit: default_quota_limit(),
            daily_upload_limit: default_upload_limit(),
            enabled: true,
        }
    }
}

/// Usage of one account on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub account_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub api_calls: u64,
    #[serde(default)]
    pub uploads: u32,
    #[serde(default)]
    pub last_upload: Option<DateTime<Local>>,
}

/// Snapshot of an account's standing for today.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountStatus {
    pub account_id: String,
    pub name: String,
    pub enabled: bool,
    pub uploads_used: u32,
    pub uploads_limit: u32,
    pub uploads_remaining: u32,
    pub api_calls_used: u64,
    pub api_calls_limit: u64,
    pub quota_percentage: f64,
    pub last_upload: Option<DateTime<Local>>,
    pub can_upload: bool,
}

/// Account selection and bookkeeping used by the queue worker.
#[async_trait]
pub trait AccountPool: Send + Sync {
    /// Account bound to a chat, else the best available one.
    fn get_chat_account(&self, chat_id: &str) -> Option<YoutubeAccount>;

    fn get_best_account_for_upload(&self) -> Option<YoutubeAccount>;

    async fn get_credentials_for_account(&self, account_id: &str) -> YoutubeResult<Credentials>;

    fn record_upload(&self, account_id: &str, api_calls_used: u64);
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<YoutubeAccount>,
    #[serde(default)]
    chat_mappings: BTreeMap<String, String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Default)]
struct AccountState {
    config: AccountsFile,
    usage: BTreeMap<String, QuotaUsage>,
}

impl AccountState {
    fn account(&self, account_id: &str) -> Option<&YoutubeAccount> {
        self.config.accounts.iter().find(|a| a.account_id == account_id)
    }

    fn usage_on(&self, account_id: &str, today: NaiveDate) -> (u32, u64, Option<DateTime<Local>>) {
        match self.usage.get(account_id) {
            Some(u) if u.date == today => (u.uploads, u.api_calls, u.last_upload),
            _ => (0, 0, None),
        }
    }
}

/// File-backed account pool.
pub struct MultiAccountManager {
    config_dir: PathBuf,
    credentials: Arc<dyn CredentialProvider>,
    state: Mutex<AccountState>,
}

impl MultiAccountManager {
    /// Load `accounts.json` and today's usage from `config_dir`, writing a
    /// single `main` account when no configuration exists.
    pub fn open(config_dir: impl Into<PathBuf>, credentials: Arc<dyn CredentialProvider>) -> YoutubeResult<Self> {
        Self::open_on(config_dir, credentials, Local::now().date_naive())
    }

    pub fn open_on(
        config_dir: impl Into<PathBuf>,
        credentials: Arc<dyn CredentialProvider>,
        today: NaiveDate,
    ) -> YoutubeResult<Self> {
        let config_dir = config_dir.into();
        std::fs::create_dir_all(&config_dir)?;

        let accounts_path = config_dir.join(ACCOUNTS_FILE);
        let config = match std::fs::read(&accounts_path) {
            Ok(raw) => match serde_json::from_slice::<AccountsFile>(&raw) {
                Ok(config) => {
                    info!(
                        accounts = config.accounts.len(),
                        mappings = config.chat_mappings.len(),
                        "Account configuration loaded"
                    );
                    config
                }
                Err(e) => {
                    error!(path = %accounts_path.display(), "Invalid account configuration, using default: {}", e);
                    default_config(&config_dir)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = default_config(&config_dir);
                write_json(&accounts_path, &config);
                config
            }
            Err(e) => return Err(e.into()),
        };

        let usage_path = config_dir.join(USAGE_FILE);
        let usage = match std::fs::read(&usage_path) {
            Ok(raw) => match serde_json::from_slice::<BTreeMap<String, QuotaUsage>>(&raw) {
                Ok(all) => all.into_iter().filter(|(_, u)| u.date == today).collect(),
                Err(e) => {
                    error!(path = %usage_path.display(), "Unreadable quota usage, starting fresh: {}", e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Ok(Self {
            config_dir,
            credentials,
            state: Mutex::new(AccountState { config, usage }),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn lock(&self) -> MutexGuard<'_, AccountState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save_config(&self, state: &AccountState) {
        write_json(&self.config_dir.join(ACCOUNTS_FILE), &state.config);
    }

    fn save_usage(&self, state: &AccountState) {
        write_json(&self.config_dir.join(USAGE_FILE), &state.usage);
    }

    pub fn accounts(&self) -> Vec<YoutubeAccount> {
        self.lock().config.accounts.clone()
    }

    /// Register an account; its client-secrets file must exist.
    pub fn add_account(&self, account: YoutubeAccount) -> YoutubeResult<()> {
        if !account.credentials_path.exists() {
            return Err(YoutubeError::account(format!(
                "credentials file not found: {}",
                account.credentials_path.display()
            )));
        }
        let mut state = self.lock();
        info!(account_id = %account.account_id, name = %account.name, "Account added");
        match state.config.accounts.iter_mut().find(|a| a.account_id == account.account_id) {
            Some(existing) => *existing = account,
            None => state.config.accounts.push(account),
        }
        self.save_config(&state);
        Ok(())
    }

    /// Drop an account with its chat bindings and usage.
    pub fn remove_account(&self, account_id: &str) -> bool {
        let mut state = self.lock();
        let before = state.config.accounts.len();
        state.config.accounts.retain(|a| a.account_id != account_id);
        if state.config.accounts.len() == before {
            return false;
        }
        state.config.chat_mappings.retain(|_, a| a != account_id);
        state.usage.remove(account_id);
        self.save_config(&state);
        self.save_usage(&state);
        info!(account_id = %account_id, "Account removed");
        true
    }

    /// Bind a chat to an enabled account.
    pub fn set_chat_account(&self, chat_id: &str, account_id: &str) -> YoutubeResult<()> {
        let mut state = self.lock();
        match state.account(account_id) {
            None => return Err(YoutubeError::account(format!("unknown account: {}", account_id))),
            Some(a) if !a.enabled => return Err(YoutubeError::account(format!("account disabled: {}", account_id))),
            Some(_) => {}
        }
        state.config.chat_mappings.insert(chat_id.to_string(), account_id.to_string());
        self.save_config(&state);
        info!(chat_id = %chat_id, account_id = %account_id, "Chat bound to account");
        Ok(())
    }

    pub fn get_chat_account_on(&self, chat_id: &str, today: NaiveDate) -> Option<YoutubeAccount> {
        {
            let state = self.lock();
            let bound = state
                .config
                .chat_mappings
                .get(chat_id)
                .and_then(|id| state.account(id))
                .filter(|a| a.enabled);
            if let Some(account) = bound {
                return Some(account.clone());
            }
        }
        self.get_best_account_on(today)
    }

    /// Enabled account with the lowest utilisation. Score is
    /// `1 - max(upload ratio, quota ratio)`; saturated accounts score 0 and
    /// nothing is returned when the best score is not positive.
    pub fn get_best_account_on(&self, today: NaiveDate) -> Option<YoutubeAccount> {
        let state = self.lock();
        let mut best: Option<(&YoutubeAccount, f64)> = None;
        for account in state.config.accounts.iter().filter(|a| a.enabled) {
            let (uploads, calls, _) = state.usage_on(&account.account_id, today);
            let score = if uploads >= account.daily_upload_limit {
                0.0
            } else {
                let upload_ratio = uploads as f64 / account.daily_upload_limit.max(1) as f64;
                let quota_ratio = calls as f64 / account.daily_quota_limit.max(1) as f64;
                1.0 - upload_ratio.max(quota_ratio)
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((account, score));
            }
        }

        match best {
            None => {
                error!("No enabled account available for upload");
                None
            }
            Some((_, score)) if score <= 0.0 => {
                warn!("All accounts reached their daily limits");
                None
            }
            Some((account, score)) => {
                info!(account_id = %account.account_id, score = %format!("{:.2}", score), "Account selected for upload");
                Some(account.clone())
            }
        }
    }

    pub fn record_upload_at(&self, account_id: &str, api_calls_used: u64, now: DateTime<Local>) {
        let today = now.date_naive();
        let mut state = self.lock();
        let usage = state.usage.entry(account_id.to_string()).or_insert_with(|| QuotaUsage {
            account_id: account_id.to_string(),
            date: today,
            api_calls: 0,
            uploads: 0,
            last_upload: None,
        });
        if usage.date != today {
            usage.date = today;
            usage.api_calls = 0;
            usage.uploads = 0;
        }
        usage.uploads += 1;
        usage.api_calls += api_calls_used;
        usage.last_upload = Some(now);
        let uploads = usage.uploads;

        let limit = state.account(account_id).map_or(0, |a| a.daily_upload_limit);
        info!(account_id = %account_id, "Upload recorded: {}/{} uploads", uploads, limit);
        self.save_usage(&state);
    }

    /// Today's usage for one account.
    pub fn usage(&self, account_id: &str) -> Option<QuotaUsage> {
        let today = Local::now().date_naive();
        self.lock().usage.get(account_id).filter(|u| u.date == today).cloned()
    }

    pub fn get_account_status_on(&self, account_id: &str, today: NaiveDate) -> Option<AccountStatus> {
        let state = self.lock();
        let account = state.account(account_id)?;
        let (uploads, calls, last_upload) = state.usage_on(account_id, today);
        Some(AccountStatus {
            account_id: account.account_id.clone(),
            name: account.name.clone(),
            enabled: account.enabled,
            uploads_used: uploads,
            uploads_limit: account.daily_upload_limit,
            uploads_remaining: account.daily_upload_limit.saturating_sub(uploads),
            api_calls_used: calls,
            api_calls_limit: account.daily_quota_limit,
            quota_percentage: calls as f64 * 100.0 / account.daily_quota_limit.max(1) as f64,
            last_upload,
            can_upload: account.enabled && uploads < account.daily_upload_limit,
        })
    }

    pub fn get_account_status(&self, account_id: &str) -> Option<AccountStatus> {
        self.get_account_status_on(account_id, Local::now().date_naive())
    }

    pub fn get_all_accounts_status(&self) -> Vec<AccountStatus> {
        let today = Local::now().date_naive();
        let ids: Vec<String> = self.lock().config.accounts.iter().map(|a| a.account_id.clone()).collect();
        ids.iter().filter_map(|id| self.get_account_status_on(id, today)).collect()
    }
}

#[async_trait]
impl AccountPool for MultiAccountManager {
    fn get_chat_account(&self, chat_id: &str) -> Option<YoutubeAccount> {
        self.get_chat_account_on(chat_id, Local::now().date_naive())
    }

    fn get_best_account_for_upload(&self) -> Option<YoutubeAccount> {
        self.get_best_account_on(Local::now().date_naive())
    }

    async fn get_credentials_for_account(&self, account_id: &str) -> YoutubeResult<Credentials> {
        let account = self
            .lock()
            .account(account_id)
            .cloned()
            .ok_or_else(|| YoutubeError::account(format!("unknown account: {}", account_id)))?;
        self.credentials
            .get_credentials(YOUTUBE_SCOPES, &account.credentials_path, &account.token_path)
            .await
            .inspect_err(|e| error!(account_id = %account_id, "Credentials unavailable: {}", e))
    }

    fn record_upload(&self, account_id: &str, api_calls_used: u64) {
        self.record_upload_at(account_id, api_calls_used, Local::now());
    }
}

fn default_config(config_dir: &Path) -> AccountsFile {
    AccountsFile {
        accounts: vec![YoutubeAccount::new(
            "main",
            "Compte Principal",
            config_dir.join("credentials_main.json"),
            config_dir.join("token_main.json"),
        )],
        ..Default::default()
    }
}

/// Persistence failures are logged; the in-memory state stays authoritative.
fn write_json<T: Serialize>(path: &Path, value: &T) {
    let result = serde_json::to_vec_pretty(value)
        .map_err(YoutubeError::from)
        .and_then(|bytes| std::fs::write(path, bytes).map_err(YoutubeError::from));
    if let Err(e) = result {
        error!(path = %path.display(), "Failed to save account data: {}", e);
    }
}
