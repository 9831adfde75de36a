//! Veil CLI tools: handshake, secure requests, diagnostics.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::debug;

use veil_client::{ClientConfig, CredentialStore, NoCredentials, SecureService, StaticToken};
use veil_common::Method;
use veil_crypto::SessionKey;

#[derive(Parser, Debug)]
#[command(name = "veil")]
#[command(about = "Veil CLI tools")]
struct Args {
    #[command(flatten)]
    server: ServerArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct ServerArgs {
    /// API base URL
    #[arg(long, global = true, env = "VEIL_API_URL", default_value = "http://127.0.0.1:3000")]
    api_url: String,

    /// Public key endpoint
    #[arg(long, global = true, env = "VEIL_PUBKEY_PATH", default_value = "/api/crypto/pubkey")]
    pubkey_path: String,

    /// Session creation endpoint
    #[arg(long, global = true, env = "VEIL_SESSION_PATH", default_value = "/api/crypto/session")]
    session_path: String,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "VEIL_HTTP_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Bearer token sent with authenticated requests
    #[arg(long, global = true, env = "VEIL_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Establish a session and print its id
    Handshake,

    /// Establish a session, then send an encrypted JSON payload
    Send {
        /// Endpoint path, e.g. /api/assignments
        endpoint: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "POST")]
        method: Method,

        /// JSON payload
        #[arg(short, long, default_value = "{}")]
        data: String,

        /// Bind the envelope to this context string
        #[arg(long)]
        context: Option<String>,
    },

    /// Encrypt and decrypt locally with a fresh key
    Selftest,

    /// Show version information
    Version,
}

impl ServerArgs {
    fn config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::new(&self.api_url)?;
        config.public_key_path = self.pubkey_path.clone();
        config.session_path = self.session_path.clone();
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    fn credentials(&self) -> Arc<dyn CredentialStore> {
        match &self.token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(NoCredentials),
        }
    }

    fn service(&self) -> Result<SecureService> {
        Ok(SecureService::over_http(self.config()?, self.credentials())?)
    }
}

fn main() -> Result<()> {
    veil_common::init_tracing();

    let args = Args::parse();

    match args.command {
        Command::Handshake => {
            let service = args.server.service()?;
            let rt = runtime()?;
            let session = rt
                .block_on(service.establish_session())
                .context("handshake failed")?;
            println!("Session: {}", session.id());
        }
        Command::Send {
            endpoint,
            method,
            data,
            context,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&data).context("payload is not valid JSON")?;
            let service = args.server.service()?;
            let rt = runtime()?;

            let reply = rt.block_on(async {
                let session = service
                    .establish_session()
                    .await
                    .context("handshake failed")?;
                debug!("using session {}", session.id());

                let reply = match context.as_deref() {
                    Some(context) => {
                        service
                            .secure_send_with_context(&endpoint, method, &payload, context)
                            .await
                    }
                    None => service.secure_send(&endpoint, method, &payload).await,
                };
                reply.with_context(|| format!("{} {} failed", method, endpoint))
            })?;

            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        Command::Selftest => selftest()?,
        Command::Version => {
            println!("veil {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn selftest() -> Result<()> {
    let key = SessionKey::generate();
    let plaintext = "Hello, World!";

    let sealed = veil_crypto::encrypt(&key, plaintext, None)?;
    println!("iv:         {}", sealed.iv);
    println!("ciphertext: {}", sealed.ciphertext);

    let opened = veil_crypto::decrypt(&key, &sealed, None)?;
    anyhow::ensure!(opened == plaintext, "round trip mismatch");
    println!("decrypted:  {}", opened);

    let mut tampered = sealed.clone();
    tampered.ciphertext = flip_first_byte(&tampered.ciphertext)?;
    anyhow::ensure!(
        veil_crypto::decrypt(&key, &tampered, None).is_err(),
        "tampered ciphertext was accepted"
    );
    println!("tamper check: ok");

    Ok(())
}

fn flip_first_byte(text: &str) -> Result<String> {
    let mut bytes = veil_crypto::decode_text_to_bytes(text)?;
    if let Some(first) = bytes.first_mut() {
        *first ^= 0x01;
    }
    Ok(veil_crypto::encode_bytes_to_text(&bytes))
}
