use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::features::auth;
use crate::features::files::{dtos as files_dtos, handlers as files_handlers};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Owner-scoped
        files_handlers::upload_file,
        files_handlers::upload_files,
        files_handlers::list_files,
        files_handlers::list_categories,
        files_handlers::get_file,
        files_handlers::download_file,
        files_handlers::delete_file,
        // Public
        files_handlers::preview_public_file,
    ),
    components(
        schemas(
            // Shared
            Meta,
            auth::model::AuthenticatedUser,
            // Files
            files_dtos::UploadFileDto,
            files_dtos::BatchUploadFileDto,
            files_dtos::FileResponseDto,
            files_dtos::BatchUploadResponseDto,
            files_dtos::DeleteFileResponseDto,
            ApiResponse<files_dtos::FileResponseDto>,
            ApiResponse<Vec<files_dtos::FileResponseDto>>,
            ApiResponse<files_dtos::BatchUploadResponseDto>,
            ApiResponse<files_dtos::DeleteFileResponseDto>,
            ApiResponse<Vec<String>>,
        )
    ),
    tags(
        (name = "files", description = "File upload, retrieval and management"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Filevault API",
        version = "0.1.0",
        description = "API documentation for Filevault",
    )
)]
pub struct ApiDoc;

/// Adds Bearer JWT security scheme to OpenAPI spec
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Overrides OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}
