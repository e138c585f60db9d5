//! Site content endpoints.
//!
//! Public pages read unauthenticated resources under `/api/`. The admin
//! dashboard manages the same content through [`AdminResource`] handles
//! rooted at `/api/admin/<name>/`, which go through the refresh protocol.
//! Content schemas are left to the caller as `serde_json::Value`.

use crate::client::{ApiClient, MultipartPart};
use crate::error::ApiError;
use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Multipart field name the backend expects for uploaded images.
pub const IMAGE_FIELD: &str = "image";

/// Admin collections exposed by the backend.
pub mod admin {
    pub const BANNERS: &str = "banners";
    pub const PROGRAMS: &str = "programs";
    pub const PROJECTS: &str = "projects";
    pub const STORIES: &str = "stories";
    pub const NEWS: &str = "news";
    pub const IMPACTS: &str = "impacts";
    pub const CONTACTS: &str = "contacts";
    /// Singleton, updated with [`super::AdminResource::replace`].
    pub const ABOUT: &str = "about";
    /// Singleton, updated with [`super::AdminResource::replace`].
    pub const CONTACT_INFO: &str = "contact-info";
}

/// An image to upload, sent as the `image` multipart field.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl ImageUpload {
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
            content_type: None,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, mime: impl Into<String>) -> Self {
        self.content_type = Some(mime.into());
        self
    }

    fn into_part(self) -> MultipartPart {
        let part = MultipartPart::file(IMAGE_FIELD, self.file_name, self.bytes);
        match self.content_type {
            Some(mime) => part.with_content_type(mime),
            None => part,
        }
    }
}

/// Build multipart parts from an optional image plus text fields.
#[must_use]
pub fn form_parts<K, V>(
    image: Option<ImageUpload>,
    fields: impl IntoIterator<Item = (K, V)>,
) -> Vec<MultipartPart>
where
    K: Into<String>,
    V: Into<String>,
{
    image
        .map(ImageUpload::into_part)
        .into_iter()
        .chain(
            fields
                .into_iter()
                .map(|(name, value)| MultipartPart::text(name, value)),
        )
        .collect()
}

impl ApiClient {
    /// `GET /api/banner/`
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`].
    pub async fn banner(&self) -> Result<Value, ApiError> {
        self.get_json("/api/banner/").await
    }

    /// `GET /api/about/`
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`].
    pub async fn about(&self) -> Result<Value, ApiError> {
        self.get_json("/api/about/").await
    }

    /// `GET /api/projects/`
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`].
    pub async fn projects(&self) -> Result<Value, ApiError> {
        self.get_json("/api/projects/").await
    }

    /// `GET /api/impact/`
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`].
    pub async fn impact(&self) -> Result<Value, ApiError> {
        self.get_json("/api/impact/").await
    }

    /// `GET /api/stories/`
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`].
    pub async fn stories(&self) -> Result<Value, ApiError> {
        self.get_json("/api/stories/").await
    }

    /// `GET /api/news/`
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`].
    pub async fn news(&self) -> Result<Value, ApiError> {
        self.get_json("/api/news/").await
    }

    /// `GET /api/news/{slug}/`
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`].
    pub async fn news_by_slug(&self, slug: &str) -> Result<Value, ApiError> {
        self.get_json(&format!("/api/news/{slug}/")).await
    }

    /// `POST /api/contact/`
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`]; validation failures keep the server body.
    pub async fn send_contact<B: Serialize + ?Sized>(
        &self,
        payload: &B,
    ) -> Result<Value, ApiError> {
        self.send_json(Method::POST, "/api/contact/", payload).await
    }

    /// `POST path` as multipart with `image` plus extra text fields.
    ///
    /// # Errors
    ///
    /// Any normalized [`ApiError`].
    pub async fn upload_file<K, V>(
        &self,
        path: &str,
        image: ImageUpload,
        extra: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Value, ApiError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.send_multipart(Method::POST, path, form_parts(Some(image), extra))
            .await
    }

    /// Handle for the admin collection `name`.
    #[must_use]
    pub fn admin(&self, name: &str) -> AdminResource {
        AdminResource {
            client: self.clone(),
            root: format!("/api/admin/{}/", name.trim_matches('/')),
        }
    }
}

/// CRUD handle for one admin collection.
#[derive(Clone)]
pub struct AdminResource {
    client: ApiClient,
    root: String,
}

impl fmt::Debug for AdminResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminResource")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::missing_errors_doc)]
impl AdminResource {
    /// Collection path, e.g. `/api/admin/banners/`.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Item path, e.g. `/api/admin/banners/7/`.
    #[must_use]
    pub fn item_path(&self, id: impl fmt::Display) -> String {
        format!("{}{id}/", self.root)
    }

    pub async fn list(&self) -> Result<Value, ApiError> {
        self.client.get_json(&self.root).await
    }

    pub async fn get(&self, id: impl fmt::Display) -> Result<Value, ApiError> {
        self.client.get_json(&self.item_path(id)).await
    }

    pub async fn create<B: Serialize + ?Sized>(&self, body: &B) -> Result<Value, ApiError> {
        self.client.send_json(Method::POST, &self.root, body).await
    }

    pub async fn create_multipart(&self, parts: Vec<MultipartPart>) -> Result<Value, ApiError> {
        self.client
            .send_multipart(Method::POST, &self.root, parts)
            .await
    }

    pub async fn update<B: Serialize + ?Sized>(
        &self,
        id: impl fmt::Display,
        body: &B,
    ) -> Result<Value, ApiError> {
        self.client
            .send_json(Method::PUT, &self.item_path(id), body)
            .await
    }

    pub async fn update_multipart(
        &self,
        id: impl fmt::Display,
        parts: Vec<MultipartPart>,
    ) -> Result<Value, ApiError> {
        self.client
            .send_multipart(Method::PUT, &self.item_path(id), parts)
            .await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        id: impl fmt::Display,
        body: &B,
    ) -> Result<Value, ApiError> {
        self.client
            .send_json(Method::PATCH, &self.item_path(id), body)
            .await
    }

    pub async fn delete(&self, id: impl fmt::Display) -> Result<(), ApiError> {
        self.client.delete(&self.item_path(id)).await
    }

    /// `PUT` the collection root, for singleton documents.
    pub async fn replace<B: Serialize + ?Sized>(&self, body: &B) -> Result<Value, ApiError> {
        self.client.send_json(Method::PUT, &self.root, body).await
    }

    /// Multipart `PUT` of the collection root.
    pub async fn replace_multipart(&self, parts: Vec<MultipartPart>) -> Result<Value, ApiError> {
        self.client
            .send_multipart(Method::PUT, &self.root, parts)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::token_store::MemoryTokenStore;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(
            ClientConfig::new(server.uri()),
            Arc::new(MemoryTokenStore::with_tokens("A", "R")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_news_by_slug() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/news/flood-relief-2024/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "slug": "flood-relief-2024",
                "title": "Flood relief"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let item = client(&server).news_by_slug("flood-relief-2024").await.unwrap();
        assert_eq!(item["title"], "Flood relief");
    }

    #[tokio::test]
    async fn test_send_contact_surfaces_validation_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/contact/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "email": ["Enter a valid email address."]
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .send_contact(&serde_json::json!({ "name": "R", "email": "nope" }))
            .await
            .unwrap_err();

        assert_eq!(err.status, Some(400));
        assert!(err.body_text().unwrap().contains("Enter a valid email address."));
    }

    #[tokio::test]
    async fn test_admin_crud_paths() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/admin/stories/"))
            .and(header("authorization", "Bearer A"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/admin/stories/5/"))
            .and(body_json(serde_json::json!({ "is_active": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 5 })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/admin/stories/5/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let stories = client(&server).admin(admin::STORIES);
        assert_eq!(stories.root(), "/api/admin/stories/");

        stories.list().await.unwrap();
        let patched = stories
            .patch(5, &serde_json::json!({ "is_active": false }))
            .await
            .unwrap();
        assert_eq!(patched["id"], 5);
        stories.delete(5).await.unwrap();
    }

    #[tokio::test]
    async fn test_singleton_replace_uses_put_on_root() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/admin/contact-info/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "phone": "1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let info = client(&server)
            .admin(admin::CONTACT_INFO)
            .replace(&serde_json::json!({ "phone": "1" }))
            .await
            .unwrap();
        assert_eq!(info["phone"], "1");
    }

    #[tokio::test]
    async fn test_upload_file_sends_image_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/admin/banners/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let image = ImageUpload::new("hero.jpg", Bytes::from_static(b"jpeg"))
            .with_content_type("image/jpeg");
        client(&server)
            .upload_file("/api/admin/banners/", image, [("title", "Welcome")])
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains("name=\"image\""));
        assert!(body.contains("filename=\"hero.jpg\""));
        assert!(body.contains("name=\"title\""));
    }

    #[test]
    fn test_form_parts_order() {
        let parts = form_parts(
            Some(ImageUpload::new("a.png", Bytes::new())),
            [("title", "t"), ("order", "2")],
        );
        let names: Vec<&str> = parts.iter().map(MultipartPart::name).collect();
        assert_eq!(names, ["image", "title", "order"]);

        let no_image = form_parts(None, [("title", "t")]);
        assert_eq!(no_image.len(), 1);
    }
}
