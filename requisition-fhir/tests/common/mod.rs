#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;

use async_trait::async_trait;
use requisition_core::ViewerError;
use requisition_fhir::FhirTransport;
use serde_json::Value;

pub const BASE: &str = "https://fhir.example.org/r4";

/// In-memory transport answering from a fixed table and recording every GET.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: HashMap<String, Result<Value, ViewerError>>,
    requests: RefCell<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, body: Value) -> Self {
        self.responses.insert(url.to_string(), Ok(body));
        self
    }

    pub fn fail(mut self, url: &str, err: ViewerError) -> Self {
        self.responses.insert(url.to_string(), Err(err));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

#[async_trait(?Send)]
impl FhirTransport for ScriptedTransport {
    async fn get_json(&self, url: &str) -> Result<Value, ViewerError> {
        self.requests.borrow_mut().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .unwrap_or_else(|| {
                Err(ViewerError::Fetch {
                    status: Some(404),
                    message: "Not Found".to_string(),
                })
            })
    }
}

pub fn fixture(name: &str) -> Value {
    let path = format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"));
    let text = fs::read_to_string(&path).expect("Cannot read fixture");
    serde_json::from_str(&text).expect("Fixture is not valid JSON")
}
