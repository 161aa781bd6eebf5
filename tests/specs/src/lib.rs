// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end test harness (§8 "End-to-end scenarios").
//!
//! Spawns the four real service binaries (`token-store`, `authz-relay`,
//! `authz-worker`, `authz-ingress`) as subprocesses against a live Postgres
//! and NATS, and exercises them over plain HTTP — mirroring the teacher's
//! `CoopProcess` harness, generalized from one binary to a small fleet that
//! all need to be up before a scenario can run.
//!
//! Every test built on top of this harness requires `PAYAUTH_DATABASE_URL`,
//! `PAYAUTH_TOKEN_STORE_DATABASE_URL`, and `PAYAUTH_NATS_URL` to point at
//! real, already-migrated infrastructure (see `migrations/`); they are
//! `#[ignore]`d so a plain `cargo test` run in this environment does not
//! attempt to reach them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls. Safe to call
/// multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

fn workspace_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    manifest.parent().and_then(|p| p.parent()).map(Path::to_path_buf).unwrap_or_else(|| manifest.to_path_buf())
}

fn binary_path(name: &str) -> PathBuf {
    workspace_root().join("target").join("debug").join(name)
}

/// Find a free TCP port by binding to :0 and releasing it immediately.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Read the required env var for a piece of live infrastructure, or return
/// an error a caller can turn into a graceful skip.
pub fn required_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("{name} is not set; skipping live-infrastructure test"))
}

/// Poll `GET {base_url}/health` until it responds successfully or the
/// timeout elapses.
pub async fn wait_healthy(base_url: &str, timeout: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + timeout;
    let url = format!("{base_url}/health");
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("{base_url} did not become healthy within {timeout:?}");
        }
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn write_json(dir: &Path, filename: &str, value: &serde_json::Value) -> anyhow::Result<PathBuf> {
    let path = dir.join(filename);
    std::fs::write(&path, serde_json::to_vec_pretty(value)?)?;
    Ok(path)
}

fn random_hex_key() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A running instance of one of the four service binaries, killed on drop.
pub struct ServiceProcess {
    child: Child,
    pub port: u16,
}

impl ServiceProcess {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for ServiceProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// The full fleet plus the shared fixtures (API keys, encryption keys)
/// scenarios need to build requests.
pub struct Fleet {
    pub token_store: ServiceProcess,
    pub relay: ServiceProcess,
    pub worker: ServiceProcess,
    pub ingress: ServiceProcess,
    pub restaurant_api_key: String,
    pub restaurant_id: String,
    pub partner_key_id: String,
    pub partner_key: [u8; 32],
    _fixture_dir: tempfile::TempDir,
}

impl Fleet {
    /// Spawn all four binaries against the given Postgres/NATS and wait
    /// until each reports healthy. `payauth_db_url` backs ingress/worker/
    /// relay; `token_store_db_url` backs the Token Store's own database
    /// (§6 PCI scope minimization) — both must already be migrated via
    /// `migrations/`.
    pub async fn start(payauth_db_url: &str, token_store_db_url: &str, nats_url: &str) -> anyhow::Result<Self> {
        ensure_crypto();

        let fixture_dir = tempfile::tempdir()?;
        let restaurant_id = "restaurant_e2e".to_owned();
        let restaurant_api_key = format!("sk_test_{}", uuid::Uuid::new_v4().simple());
        let service_auth_secret = format!("svc_{}", uuid::Uuid::new_v4().simple());
        let partner_key_id = "partner_e2e".to_owned();
        let partner_key_hex = random_hex_key();
        let service_key_hex = random_hex_key();

        let ingress_api_keys_path = write_json(
            fixture_dir.path(),
            "ingress_api_keys.json",
            &serde_json::json!({ restaurant_api_key.clone(): restaurant_id.clone() }),
        )?;
        let token_store_api_keys_path = write_json(
            fixture_dir.path(),
            "token_store_api_keys.json",
            &serde_json::json!({ restaurant_api_key.clone(): restaurant_id.clone() }),
        )?;
        let partner_keys_path = write_json(
            fixture_dir.path(),
            "partner_keys.json",
            &serde_json::json!({ partner_key_id.clone(): partner_key_hex.clone() }),
        )?;

        let token_store_port = free_port()?;
        let token_store = spawn_service(
            &binary_path("token-store"),
            [
                ("PAYAUTH_TOKEN_STORE_DATABASE_URL", token_store_db_url.to_owned()),
                ("PAYAUTH_TOKEN_STORE_HOST", "127.0.0.1".to_owned()),
                ("PAYAUTH_TOKEN_STORE_PORT", token_store_port.to_string()),
                ("PAYAUTH_TOKEN_STORE_API_KEYS_FILE", token_store_api_keys_path.display().to_string()),
                ("PAYAUTH_TOKEN_STORE_PARTNER_KEYS_FILE", partner_keys_path.display().to_string()),
                ("PAYAUTH_TOKEN_STORE_PRIMARY_ENCRYPTION_KEY", service_key_hex.clone()),
                ("PAYAUTH_TOKEN_STORE_CURRENT_KEY_VERSION", "1".to_owned()),
                ("PAYAUTH_TOKEN_STORE_SERVICE_AUTH", service_auth_secret.clone()),
                ("PAYAUTH_TOKEN_STORE_ALLOWED_SERVICES", "authz-worker".to_owned()),
            ],
            token_store_port,
        )?;
        wait_healthy(&token_store.base_url(), Duration::from_secs(10)).await?;

        let relay_port = free_port()?; // unused by the relay itself; kept for a uniform spawn signature
        let relay = spawn_service(
            &binary_path("authz-relay"),
            [
                ("PAYAUTH_DATABASE_URL", payauth_db_url.to_owned()),
                ("PAYAUTH_NATS_URL", nats_url.to_owned()),
                ("PAYAUTH_RELAY_POLL_INTERVAL_MS", "100".to_owned()),
            ],
            relay_port,
        )?;

        let worker_port = free_port()?; // unused by the worker itself; kept for a uniform spawn signature
        let worker = spawn_service(
            &binary_path("authz-worker"),
            [
                ("PAYAUTH_DATABASE_URL", payauth_db_url.to_owned()),
                ("PAYAUTH_NATS_URL", nats_url.to_owned()),
                ("PAYAUTH_TOKEN_STORE_URL", token_store.base_url()),
                ("PAYAUTH_TOKEN_STORE_SERVICE_AUTH", service_auth_secret.clone()),
                ("PAYAUTH_TOKEN_STORE_SERVICE_IDENTITY", "authz-worker".to_owned()),
                ("PAYAUTH_WORKER_CONSUMER_COUNT", "2".to_owned()),
                ("PAYAUTH_WORKER_LOCK_TTL_SECS", "10".to_owned()),
                ("PAYAUTH_WORKER_POLL_WAIT_MS", "250".to_owned()),
                ("PAYAUTH_MAX_RETRIES", "3".to_owned()),
                ("PAYAUTH_RETRY_BASE_MS", "50".to_owned()),
            ],
            worker_port,
        )?;

        let ingress_port = free_port()?;
        let ingress = spawn_service(
            &binary_path("authz-ingress"),
            [
                ("PAYAUTH_DATABASE_URL", payauth_db_url.to_owned()),
                ("PAYAUTH_INGRESS_HOST", "127.0.0.1".to_owned()),
                ("PAYAUTH_INGRESS_PORT", ingress_port.to_string()),
                ("PAYAUTH_INGRESS_API_KEYS_FILE", ingress_api_keys_path.display().to_string()),
                ("PAYAUTH_FAST_PATH_WAIT_MS", "5000".to_owned()),
            ],
            ingress_port,
        )?;
        wait_healthy(&ingress.base_url(), Duration::from_secs(10)).await?;

        let partner_key: [u8; 32] =
            hex::decode(&partner_key_hex)?.try_into().map_err(|_| anyhow::anyhow!("bad key length"))?;

        Ok(Self {
            token_store,
            relay,
            worker,
            ingress,
            restaurant_api_key,
            restaurant_id,
            partner_key_id,
            partner_key,
            _fixture_dir: fixture_dir,
        })
    }
}

fn spawn_service<const N: usize>(binary: &Path, env: [(&str, String); N], port: u16) -> anyhow::Result<ServiceProcess> {
    anyhow::ensure!(binary.exists(), "binary not found at {} — run `cargo build` first", binary.display());

    let mut cmd = Command::new(binary);
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.env("RUST_LOG", "warn");
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    let child = cmd.spawn()?;
    Ok(ServiceProcess { child, port })
}

/// AES-256-GCM-encrypts `plaintext` under `key`, returning
/// `(ciphertext_b64, iv_b64)` for the named-partner-key Create flow
/// (§4.7 step 1).
pub fn encrypt_for_named_key(key: &[u8; 32], plaintext: &[u8]) -> (String, String) {
    use aes_gcm::aead::{Aead, KeyInit};
    use aes_gcm::{Aes256Gcm, Key, Nonce};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use rand::RngCore;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher.encrypt(Nonce::from_slice(&nonce_bytes), plaintext).expect("encryption never fails for a fixed-size key/nonce");
    (STANDARD.encode(ciphertext), STANDARD.encode(nonce_bytes))
}

/// A thin `reqwest`-based client for the ingress HTTP surface (§6).
pub struct IngressClient {
    pub base_url: String,
    pub api_key: String,
    client: reqwest::Client,
}

impl IngressClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self { base_url, api_key, client: reqwest::Client::new() }
    }

    pub async fn authorize(&self, body: &serde_json::Value) -> anyhow::Result<(u16, serde_json::Value)> {
        let resp = self
            .client
            .post(format!("{}/v1/authorize", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        Ok((status, resp.json().await?))
    }

    pub async fn status(&self, auth_request_id: &str, restaurant_id: &str) -> anyhow::Result<(u16, serde_json::Value)> {
        let resp = self
            .client
            .get(format!("{}/v1/authorize/{}/status", self.base_url, auth_request_id))
            .query(&[("restaurant_id", restaurant_id)])
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        let status = resp.status().as_u16();
        Ok((status, resp.json().await?))
    }

    pub async fn void(&self, auth_request_id: &str, body: &serde_json::Value) -> anyhow::Result<(u16, serde_json::Value)> {
        let resp = self
            .client
            .post(format!("{}/v1/authorize/{}/void", self.base_url, auth_request_id))
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        Ok((status, resp.json().await?))
    }

    /// Poll `status` until the response is terminal or the timeout elapses.
    pub async fn wait_for_terminal(
        &self,
        auth_request_id: &str,
        restaurant_id: &str,
        timeout: Duration,
    ) -> anyhow::Result<serde_json::Value> {
        const TERMINAL: &[&str] = &["AUTHORIZED", "DENIED", "FAILED", "EXPIRED", "VOIDED"];
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let (_, body) = self.status(auth_request_id, restaurant_id).await?;
            if let Some(status) = body["status"].as_str() {
                if TERMINAL.contains(&status) {
                    return Ok(body);
                }
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("auth request {auth_request_id} did not reach a terminal state within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// A thin `reqwest`-based client for the Token Store's client-facing
/// surface (§6).
pub struct TokenStoreClient {
    pub base_url: String,
    pub api_key: String,
    client: reqwest::Client,
}

impl TokenStoreClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self { base_url, api_key, client: reqwest::Client::new() }
    }

    pub async fn create_token(&self, body: &serde_json::Value) -> anyhow::Result<(u16, serde_json::Value)> {
        let resp = self
            .client
            .post(format!("{}/v1/payment-tokens", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        Ok((status, resp.json().await?))
    }
}

/// Build a `CreatePaymentTokenRequest`-shaped body (named-partner-key
/// flow) for a sample card, matching `authz_core::token_contract`'s wire
/// shape (§4.7 step 1's `encryption_metadata`).
pub fn sample_create_token_request(fleet: &Fleet, pan: &str) -> serde_json::Value {
    let payment_data = serde_json::json!({
        "pan": pan,
        "expiry_month": 12,
        "expiry_year": 2030,
        "cvv": "123",
        "cardholder_name": "Jane Doe",
    });
    let plaintext = serde_json::to_vec(&payment_data).expect("payment data is always serializable");
    let (ciphertext_b64, iv_b64) = encrypt_for_named_key(&fleet.partner_key, &plaintext);

    serde_json::json!({
        "restaurant_id": fleet.restaurant_id,
        "encrypted_payment_data": ciphertext_b64,
        "idempotency_key": null,
        "client_metadata": null,
        "device_token": null,
        "encryption_metadata": {
            "key_id": fleet.partner_key_id,
            "algorithm": "AES-256-GCM",
            "iv_b64": iv_b64,
        },
    })
}

/// A fresh idempotency key for one call site, distinguishable across
/// parallel test functions without a shared counter.
pub fn fresh_idempotency_key(label: &str) -> String {
    format!("{label}-{}", uuid::Uuid::new_v4())
}
