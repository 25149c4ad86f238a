// File: src/renderer.rs
// Purpose: Renders pages for export

use async_trait::async_trait;
use std::path::PathBuf;
use trellis::{App, RenderOptions, Request, Response};

/// Something that renders a site path
///
/// `None` means nothing is exported for the path.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, path: &str) -> Option<Response>;
}

/// An [`App`] rendering in export mode
///
/// Static assets are read from disk. Unless forced, pages that do not opt
/// into prerendering are skipped.
#[derive(Clone)]
pub struct AppRenderer {
    app: App,
}

impl AppRenderer {
    pub fn new(app: &App, force: bool, static_dir: impl Into<PathBuf>) -> Self {
        let options = RenderOptions {
            only_prerender: !force,
            local: true,
            static_dir: Some(static_dir.into()),
            ..app.options().clone()
        };

        Self {
            app: app.with_render_options(options),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }
}

#[async_trait]
impl PageRenderer for AppRenderer {
    async fn render(&self, path: &str) -> Option<Response> {
        let mut request = Request::new("GET", path);
        request.host = self.app.options().host.clone();
        self.app.render(&request).await
    }
}
