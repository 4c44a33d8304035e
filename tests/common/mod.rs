#![allow(dead_code)]

use std::{
    env,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use mongodb::{Client, bson::oid::ObjectId};

use prezio::{
    config::AppConfig,
    models::{Client as ClientDoc, Template, TemplateKind},
    state::{
        AppState, ClientInput, TemplateInput, create_client, create_template, create_user,
        init_state, list_notifications,
    },
};

/// Global lock so integration tests that mutate the DB run one-at-a-time.
static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub const TEMPLATE_FILE: &str = "plain.html";
pub const TEMPLATE_MARKUP: &str = "<h1>{{ number }}</h1><p>{{ client.name }}</p>";

pub struct TestContext {
    pub state: AppState,
    pub db_name: String,
    pub templates_dir: PathBuf,
    _guard: MutexGuard<'static, ()>,
}

pub struct Fixture {
    pub user: ObjectId,
    pub email: String,
    pub client: ClientDoc,
    pub template: Template,
}

fn mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
}

pub async fn setup_state() -> Option<TestContext> {
    setup_state_with(|_| {}).await
}

pub async fn setup_state_with(tweak: impl FnOnce(&mut AppConfig)) -> Option<TestContext> {
    let guard = TEST_DB_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let uri = mongodb_uri();
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis();
    let db_name = format!("prezio_test_{stamp}");
    let templates_dir = env::temp_dir().join(&db_name);
    std::fs::create_dir_all(&templates_dir).unwrap();
    std::fs::write(templates_dir.join(TEMPLATE_FILE), TEMPLATE_MARKUP).unwrap();

    let client = match Client::with_uri_str(&uri).await {
        Ok(c) => c,
        Err(err) => {
            eprintln!("Skipping test; cannot connect to MongoDB: {err:?}");
            return None;
        }
    };
    if let Err(err) = client.database(&db_name).drop().await {
        eprintln!("Skipping test; cannot drop test DB: {err:?}");
        return None;
    }

    let mut config = AppConfig {
        mongodb_uri: uri,
        mongodb_db: db_name.clone(),
        users_file: templates_dir.join("missing-users.json").display().to_string(),
        templates_dir: templates_dir.display().to_string(),
        ..AppConfig::default()
    };
    tweak(&mut config);

    match init_state(config).await {
        Ok(state) => Some(TestContext {
            state,
            db_name,
            templates_dir,
            _guard: guard,
        }),
        Err(err) => {
            eprintln!("Skipping test; init_state failed: {err:?}");
            None
        }
    }
}

pub async fn teardown(ctx: TestContext) {
    if let Ok(client) = Client::with_uri_str(&mongodb_uri()).await {
        let _ = client.database(&ctx.db_name).drop().await;
    }
    let _ = std::fs::remove_dir_all(&ctx.templates_dir);
}

/// A user with one client and one template of `kind`.
pub async fn fixture(state: &AppState, kind: TemplateKind) -> Fixture {
    let email = format!("owner{}@prezio.test", ObjectId::new().to_hex());
    let user = create_user(state, &email, "JBSWY3DPEHPK3PXP", "Owner")
        .await
        .unwrap();
    let client = create_client(
        state,
        &user,
        ClientInput {
            name: "Acme Ltd".into(),
            address: "12 Moi Avenue, Nairobi".into(),
            contact_name: "Jane Wanjiru".into(),
            contact_phone: "+254 700 000 000".into(),
            contact_email: "jane@acme.test".into(),
        },
    )
    .await
    .unwrap();
    let template = create_template(
        state,
        TemplateInput {
            name: format!("Plain {}", kind.as_str()),
            description: String::new(),
            file: TEMPLATE_FILE.into(),
            preview_image: None,
            kind,
        },
    )
    .await
    .unwrap();
    Fixture {
        user,
        email,
        client,
        template,
    }
}

impl Fixture {
    pub fn client_id(&self) -> String {
        self.client.id.unwrap().to_hex()
    }

    pub fn template_id(&self) -> String {
        self.template.id.unwrap().to_hex()
    }
}

/// Notifications are written off the request path; poll until one titled `title` lands.
pub async fn wait_for_notification(state: &AppState, user: &ObjectId, title: &str) -> bool {
    for _ in 0..50 {
        let stored = list_notifications(state, user).await.unwrap();
        if stored.iter().any(|n| n.title == title) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
