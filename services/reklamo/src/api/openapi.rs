use super::handlers::{auth, health};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // The document falls out of router assembly; keep it and drop the router half.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Single source of truth for both routing and the generated document.
///
/// Each `.routes(routes!(...))` call registers a handler and pulls its
/// `#[utoipa::path]` metadata into the document, so an endpoint listed
/// here is served and documented in one step. `/` and `OPTIONS /health`
/// are wired separately in `api/mod.rs` and left out of the document.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut document = base_document();
    document.tags = Some(vec![
        tag("reklamo", "Consumer complaint platform API"),
        tag("auth", "Login, sessions, and two-factor management"),
    ]);

    OpenApiRouter::with_openapi(document)
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::two_factor::verify_two_factor))
        .routes(routes!(auth::two_factor::two_factor_setup))
        .routes(routes!(auth::two_factor::two_factor_enable))
        .routes(routes!(auth::two_factor::two_factor_disable))
        .routes(routes!(auth::session::session))
        .routes(routes!(auth::session::logout))
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

/// Seed the document info block from Cargo.toml metadata.
fn base_document() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(non_empty(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = contact_from_authors(env!("CARGO_PKG_AUTHORS"));
    info.license = manifest_license(env!("CARGO_PKG_LICENSE"));

    OpenApiBuilder::new().info(info).build()
}

/// First entry of the `;`-separated Cargo authors list, split into
/// name and `<email>` when both are present.
fn contact_from_authors(authors: &str) -> Option<Contact> {
    let primary = authors.split(';').map(str::trim).find(|s| !s.is_empty())?;

    let (name, email) = match primary.split_once('<') {
        Some((name, rest)) => (
            non_empty_owned(name.trim()),
            non_empty_owned(rest.trim_end_matches('>').trim()),
        ),
        None => (non_empty_owned(primary), None),
    };

    match (name, email) {
        (None, None) => None,
        (name, email) => {
            let mut contact = Contact::new();
            contact.name = name;
            contact.email = email;
            Some(contact)
        }
    }
}

fn manifest_license(raw: &str) -> Option<License> {
    let spdx = non_empty(raw)?;
    let mut license = License::new(spdx);
    license.identifier = Some(spdx.to_string());
    Some(license)
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn non_empty_owned(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_info_mirrors_manifest() {
        let info = openapi().info;
        assert_eq!(info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(info.description.as_deref(), Some(env!("CARGO_PKG_DESCRIPTION")));

        match info.contact {
            Some(contact) => {
                assert_eq!(contact.name.as_deref(), Some("Team Reklamo"));
                assert_eq!(contact.email.as_deref(), Some("team@reklamo.dev"));
            }
            None => panic!("contact block missing from the document"),
        }
        match info.license {
            Some(license) => {
                assert_eq!(license.name, "BSD-3-Clause");
                assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
            }
            None => panic!("license block missing from the document"),
        }
    }

    #[test]
    fn document_lists_tags_and_auth_paths() {
        let spec = openapi();

        let tag_names: Vec<String> = spec
            .tags
            .iter()
            .flatten()
            .map(|tag| tag.name.clone())
            .collect();
        assert_eq!(tag_names, ["reklamo", "auth"]);

        assert!(spec.paths.paths.contains_key("/v1/auth/login"));
        assert!(spec.paths.paths.contains_key("/v1/auth/two-factor/verify"));
        assert!(spec.paths.paths.contains_key("/v1/auth/session"));
    }

    #[test]
    fn contact_handles_name_only_authors() {
        let contact = contact_from_authors("Solo Maintainer");
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Solo Maintainer"));
            assert_eq!(contact.email, None);
        }
        assert!(contact_from_authors("").is_none());
    }
}
