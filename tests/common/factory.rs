use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use apicheck::models::ResourceDescriptor;
use apicheck::services::{ApiContext, ClientConfig, Credential, HttpClient, OAuth2ClientCredentials};

use super::app::{BEARER_TOKEN, CLIENT_ID, CLIENT_SECRET};

/// Client with a short timeout and `base_url` for relative paths
pub fn http_client(base_url: &str) -> HttpClient {
    HttpClient::new(ClientConfig::new(Duration::from_secs(5)).with_base_url(base_url))
        .expect("Failed to create HTTP client")
}

pub fn api(base_url: &str, credential: Credential) -> Arc<ApiContext> {
    Arc::new(ApiContext::new(
        "stub",
        http_client(base_url),
        Arc::new(credential),
    ))
}

/// Users API context carrying the token the stub expects
pub fn gorest_api(base_url: &str) -> Arc<ApiContext> {
    api(base_url, Credential::StaticToken(BEARER_TOKEN.to_string()))
}

pub fn oauth_credential(base_url: &str, skew: Duration) -> OAuth2ClientCredentials {
    OAuth2ClientCredentials::new(
        CLIENT_ID,
        CLIENT_SECRET,
        format!("{}/api/token", base_url),
        http_client(base_url),
    )
    .with_expiry_skew(skew)
}

/// The user the CRUD suite creates, with a unique email per run
pub fn user_descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(
        "/public/v2/users",
        json!({
            "name": "PW USER12",
            "gender": "male",
            "email": "pwtest{{timestamp}}@mail.com",
            "status": "active"
        }),
        json!({"status": "inactive"}),
    )
}

/// Five catalog entries shaped like the product API's list response
pub fn products() -> Value {
    json!([
        {
            "id": 1,
            "title": "Fjallraven - Foldsack No. 1 Backpack, Fits 15 Laptops",
            "price": 109.95,
            "category": "men's clothing",
            "rating": {"rate": 3.9, "count": 120}
        },
        {
            "id": 2,
            "title": "Mens Casual Premium Slim Fit T-Shirts",
            "price": 22.3,
            "category": "men's clothing",
            "rating": {"rate": 4.1, "count": 259}
        },
        {
            "id": 3,
            "title": "Mens Cotton Jacket",
            "price": 55.99,
            "category": "men's clothing",
            "rating": {"rate": 4.7, "count": 500}
        },
        {
            "id": 5,
            "title": "John Hardy Women's Legends Naga Gold & Silver Dragon Station Chain Bracelet",
            "price": 695,
            "category": "jewelery",
            "rating": {"rate": 4.6, "count": 400}
        },
        {
            "id": 6,
            "title": "Solid Gold Petite Micropave",
            "price": 168,
            "category": "jewelery",
            "rating": {"rate": 3.9, "count": 70}
        }
    ])
}

/// Schema for the users list endpoint
pub fn users_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "array",
        "items": {
            "type": "object",
            "required": ["id", "name", "email", "gender", "status"],
            "properties": {
                "id": {"type": "integer"},
                "name": {"type": "string"},
                "email": {"type": "string"},
                "gender": {"type": "string", "enum": ["male", "female"]},
                "status": {"type": "string", "enum": ["active", "inactive"]}
            }
        }
    })
}
