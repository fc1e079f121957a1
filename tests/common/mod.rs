#![allow(dead_code)]

use demeter::{builtin_config, resolve, AppState, CrudService, MemoryStore, Record};
use serde_json::Value;
use std::sync::Arc;

pub fn service() -> CrudService {
    let model = resolve(&builtin_config().unwrap()).unwrap();
    CrudService::new(Arc::new(MemoryStore::new()), Arc::new(model))
}

pub fn state() -> AppState {
    AppState::new(service())
}

pub fn record(v: Value) -> Record {
    v.as_object().cloned().expect("object literal")
}
