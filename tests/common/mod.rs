// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::Arc;

use lastbench::{
    Session, SessionProvider,
    config::Config,
    gateway::{Gateway, memory::MemoryGateway},
    models::{
        college::{College, Department},
        user::{Credentials, SignUpRequest},
    },
    storage::{MemoryObjectStore, ObjectStore},
};
use uuid::Uuid;

pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub gateway: Arc<MemoryGateway>,
    pub store: Arc<MemoryObjectStore>,
    pub provider: SessionProvider,
    pub college: College,
    pub departments: Vec<Department>,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(Config::for_tests())
}

pub fn spawn_app_with(config: Config) -> TestApp {
    let gateway = Arc::new(MemoryGateway::new(&config));
    let store = Arc::new(MemoryObjectStore::new(config.storage_public_url.clone()));
    let (college, departments) =
        gateway.seed_college("Lastbench Institute", "lastbench.edu", &["CS", "EE", "ME"]);

    let provider = SessionProvider::new(
        gateway.clone() as Arc<dyn Gateway>,
        store.clone() as Arc<dyn ObjectStore>,
        &config,
    );

    TestApp {
        gateway,
        store,
        provider,
        college,
        departments,
    }
}

impl TestApp {
    pub fn department(&self, name: &str) -> Uuid {
        self.departments
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.id)
            .unwrap_or_else(|| panic!("no department named {name}"))
    }

    pub fn unique_email(&self, name: &str) -> String {
        format!("{}_{}@lastbench.edu", name, &Uuid::new_v4().to_string()[..8])
    }

    pub fn sign_up_request(&self, name: &str, department: &str) -> SignUpRequest {
        SignUpRequest {
            credentials: Credentials {
                email: self.unique_email(name),
                password: PASSWORD.to_string(),
            },
            display_name: format!("{name} anon"),
            college_id: self.college.id,
            department_id: self.department(department),
            picture: None,
        }
    }

    /// Bytes the object store holds behind a public URL.
    pub fn stored_bytes(&self, url: &str) -> Option<Vec<u8>> {
        url.split_once("/storage/")
            .and_then(|(_, key)| self.store.get(key))
            .map(|object| object.bytes)
    }

    /// Signs up a fresh user with a complete profile.
    pub async fn sign_up(&self, name: &str, department: &str) -> Session {
        self.provider
            .sign_up(self.sign_up_request(name, department))
            .await
            .expect("sign-up should succeed")
    }
}
