//! Shared application state for all routes.

use crate::config::ResolvedModel;
use crate::service::CrudService;

#[derive(Clone)]
pub struct AppState {
    pub crud: CrudService,
}

impl AppState {
    pub fn new(crud: CrudService) -> Self {
        AppState { crud }
    }

    pub fn model(&self) -> &ResolvedModel {
        self.crud.model()
    }
}
