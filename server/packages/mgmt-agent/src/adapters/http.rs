use std::sync::Arc;

use crate::dto::HttpComponentInfo;
use crate::host::HttpRuntime;

pub struct HttpAdapter {
    runtime: Option<Arc<dyn HttpRuntime>>,
}

impl HttpAdapter {
    pub fn new(runtime: Option<Arc<dyn HttpRuntime>>) -> Self {
        Self { runtime }
    }

    /// Empty while no runtime service is registered.
    pub fn list(&self) -> Vec<HttpComponentInfo> {
        self.runtime
            .as_ref()
            .map(|runtime| runtime.components())
            .unwrap_or_default()
    }
}
