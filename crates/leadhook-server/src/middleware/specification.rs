//! OpenAPI document generation and the Scalar reference UI.

use aide::axum::ApiRouter;
use aide::openapi::{Contact, Info, License, OpenApi};
use aide::scalar::Scalar;
use axum::routing::{Router, get};
use axum::{Extension, Json};
#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

/// Where the generated specification and its UI are mounted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct OpenApiConfig {
    /// Path that serves the OpenAPI document as JSON.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "OPENAPI_JSON_PATH", default_value = "/api/openapi.json")
    )]
    pub open_api_json: String,

    /// Path that serves the Scalar API reference.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "OPENAPI_SCALAR_PATH", default_value = "/api/scalar")
    )]
    pub scalar_ui: String,
}

impl Default for OpenApiConfig {
    fn default() -> Self {
        Self {
            open_api_json: "/api/openapi.json".to_owned(),
            scalar_ui: "/api/scalar".to_owned(),
        }
    }
}

/// Extension trait for `aide::axum::`[`ApiRouter`] that finishes the API
/// document and mounts it.
pub trait RouterOpenApiExt<S> {
    /// Finishes the document with the default LeadHook [`Info`].
    fn with_open_api(self, config: &OpenApiConfig) -> Router<S>;

    /// Finishes the document with a caller supplied [`Info`].
    fn with_open_api_info(self, config: &OpenApiConfig, info: Info) -> Router<S>;
}

impl<S> RouterOpenApiExt<S> for ApiRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_open_api(self, config: &OpenApiConfig) -> Router<S> {
        let info = Info {
            title: "LeadHook API".to_owned(),
            summary: Some("Outbound webhook endpoints and delivery history.".to_owned()),
            description: Some(
                "Register webhook endpoints, inspect their delivery attempts \
                 and send signed test events."
                    .to_owned(),
            ),
            contact: Some(Contact {
                name: Some("LeadHook".to_owned()),
                ..Contact::default()
            }),
            license: Some(License {
                name: "MIT".to_owned(),
                identifier: Some("MIT".to_owned()),
                ..License::default()
            }),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            ..Info::default()
        };

        self.with_open_api_info(config, info)
    }

    fn with_open_api_info(self, config: &OpenApiConfig, info: Info) -> Router<S> {
        async fn serve_openapi(Extension(api): Extension<OpenApi>) -> Json<OpenApi> {
            Json(api)
        }

        let mut api = OpenApi {
            info,
            ..OpenApi::default()
        };

        let scalar = Scalar::new(&config.open_api_json);
        self.route(&config.scalar_ui, scalar.axum_route())
            .route(&config.open_api_json, get(serve_openapi))
            .finish_api(&mut api)
            .layer(Extension(api))
    }
}
