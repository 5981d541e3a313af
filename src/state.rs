use crate::auth::AdminAuth;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub auth: Arc<AdminAuth>,
    pub max_page_size: i64,
}
