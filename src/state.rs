use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::db;
use crate::mail::{Mailer, SmtpMailer};
use crate::storage::{Storage, StorageClient};
use crate::users::repo::{PgUserRepo, UserRepo};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn UserRepo>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await?;

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let mailer = Arc::new(SmtpMailer::new(&config.email)?) as Arc<dyn Mailer>;

        Ok(Self {
            repo: Arc::new(PgUserRepo::new(pool)),
            config: Arc::new(config),
            storage,
            mailer,
            clock: Arc::new(SystemClock),
        })
    }
}

#[cfg(test)]
pub mod test_support {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use time::OffsetDateTime;
    use tokio::sync::Mutex;

    use super::AppState;
    use crate::auth::jwt::TokenService;
    use crate::clock::ManualClock;
    use crate::config::{AppConfig, AppEnv, EmailConfig, JwtConfig, StorageConfig};
    use crate::credentials::CredentialStore;
    use crate::mail::RecordingMailer;
    use crate::storage::StorageClient;
    use crate::users::memory::MemoryUserRepo;
    use crate::users::repo_types::{AuthType, User};

    /// Keeps uploaded objects in memory.
    #[derive(Default)]
    pub struct FakeStorage {
        objects: Mutex<HashMap<String, (Bytes, String)>>,
    }

    impl FakeStorage {
        pub async fn get(&self, key: &str) -> Option<(Bytes, String)> {
            self.objects.lock().await.get(key).cloned()
        }

        pub async fn contains(&self, key: &str) -> bool {
            self.objects.lock().await.contains_key(key)
        }
    }

    #[async_trait]
    impl StorageClient for FakeStorage {
        async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
            self.objects
                .lock()
                .await
                .insert(key.to_string(), (body, content_type.to_string()));
            Ok(())
        }

        async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
            self.objects.lock().await.remove(key);
            Ok(())
        }

        async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
            Ok(format!("https://fake.local/{key}?expires={seconds}"))
        }
    }

    pub fn config(env: AppEnv) -> AppConfig {
        AppConfig {
            database_url: "postgres://unused".into(),
            env,
            public_url: "http://localhost:8080".into(),
            cors_origins: vec!["http://localhost:3000".into()],
            cookie_secure: false,
            bcrypt_cost: 4,
            jwt: JwtConfig {
                access_secret: "test-access".into(),
                access_ttl: Duration::from_secs(300),
                refresh_secret: "test-refresh".into(),
                refresh_ttl: Duration::from_secs(7 * 24 * 3600),
            },
            email: EmailConfig {
                from: "Accounts <no-reply@example.com>".into(),
                host: "localhost".into(),
                port: 2525,
                username: String::new(),
                password: String::new(),
                starttls: false,
            },
            storage: StorageConfig {
                endpoint: "http://fake".into(),
                bucket: "avatars".into(),
                access_key: "fake".into(),
                secret_key: "fake".into(),
                region: "us-east-1".into(),
            },
        }
    }

    /// Application state wired to in-memory collaborators, with handles to each.
    pub struct TestHarness {
        pub state: AppState,
        pub repo: Arc<MemoryUserRepo>,
        pub clock: Arc<ManualClock>,
        pub mailer: Arc<RecordingMailer>,
        pub storage: Arc<FakeStorage>,
    }

    impl TestHarness {
        pub fn new() -> Self {
            Self::with_env(AppEnv::Production)
        }

        pub fn with_env(env: AppEnv) -> Self {
            let repo = Arc::new(MemoryUserRepo::new());
            let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
            let mailer = Arc::new(RecordingMailer::default());
            let storage = Arc::new(FakeStorage::default());
            let state = AppState {
                repo: repo.clone(),
                config: Arc::new(config(env)),
                storage: storage.clone(),
                mailer: mailer.clone(),
                clock: clock.clone(),
            };
            Self {
                state,
                repo,
                clock,
                mailer,
                storage,
            }
        }

        pub fn credentials(&self) -> CredentialStore {
            axum::extract::FromRef::from_ref(&self.state)
        }

        pub fn tokens(&self) -> TokenService {
            axum::extract::FromRef::from_ref(&self.state)
        }

        /// Creates a user that can log in straight away.
        pub async fn verified_user(&self, name: &str, email: &str, password: &str) -> User {
            let creds = self.credentials();
            let user = creds
                .create_user(name, email, password, password, AuthType::Email)
                .await
                .expect("create user");
            creds.mark_email_verified(&user).await.expect("verify user")
        }
    }
}
