#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use anyhow::{bail, Context};
use std::io::{self, BufRead, Write};
use stokvel_session::{
    settings::StorageBackend, ClientSettings, LoginOutcome, MfaChallenge, SessionClient,
    SessionClientFactory, SessionError,
};

const MAX_OTP_ATTEMPTS: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = ClientSettings::load().context("Failed to load settings")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        return Ok(());
    };

    if settings.storage.backend == StorageBackend::Memory && command != "login" {
        log::warn!("In-memory vault: no session survives between commands, set VAULT_BACKEND=file");
    }

    let client = SessionClientFactory::from_settings(&settings)?;
    client.session.restore().await;

    match (command.as_str(), args.get(1)) {
        ("login", Some(username)) => login(&client, username).await,
        ("whoami", None) => whoami(&client).await,
        ("validate", None) => {
            let valid = client.flow.validate().await?;
            println!("{}", if valid { "valid" } else { "invalid" });
            Ok(())
        }
        ("token", None) => {
            println!("{}", client.session.get_valid_access_token().await?);
            Ok(())
        }
        ("logout", None) => {
            client.flow.logout().await?;
            println!("✓ Signed out");
            Ok(())
        }
        ("help" | "--help" | "-h", _) => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unrecognized command line: {}", args.join(" "))
        }
    }
}

async fn login(client: &SessionClient, username: &str) -> anyhow::Result<()> {
    let password = match std::env::var("STOKVEL_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => prompt("Password: ")?,
    };

    match client.flow.login(username, &password).await? {
        LoginOutcome::Established => {}
        LoginOutcome::MfaRequired(challenge) => complete_mfa(client, challenge).await?,
    }

    let identity = client.session.current_identity().await?;
    println!("✓ Signed in as {} <{}>", identity.display_name(), identity.email);
    Ok(())
}

/// Prompt for the one-time code; an empty line asks for a new one
async fn complete_mfa(client: &SessionClient, challenge: MfaChallenge) -> anyhow::Result<()> {
    println!(
        "{}",
        challenge
            .message
            .as_deref()
            .unwrap_or("A one-time code was sent to your email")
    );

    let mut attempts = 0;
    while attempts < MAX_OTP_ATTEMPTS {
        let code = prompt("One-time code (empty to resend): ")?;
        if code.is_empty() {
            client.flow.resend_mfa(&challenge).await?;
            println!("✓ New code sent to {}", challenge.email);
            continue;
        }

        attempts += 1;
        match client.flow.verify_mfa(&challenge, &code).await {
            Ok(()) => return Ok(()),
            Err(SessionError::Rejected { message, .. }) => eprintln!("✗ {message}"),
            Err(e) => {
                client.flow.cancel_mfa(challenge).await;
                return Err(e.into());
            }
        }
    }

    client.flow.cancel_mfa(challenge).await;
    bail!("too many invalid one-time codes")
}

async fn whoami(client: &SessionClient) -> anyhow::Result<()> {
    let identity = client.session.current_identity().await?;
    println!("id:       {}", identity.id);
    println!("email:    {}", identity.email);
    println!("username: {}", identity.username);
    println!("name:     {}", identity.display_name());
    if let Some(contact_number) = &identity.contact_number {
        println!("contact:  {contact_number}");
    }
    Ok(())
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        bail!("no input");
    }
    Ok(line.trim().to_string())
}

fn print_usage() {
    println!("stokvel-session {}", stokvel_session::VERSION);
    println!();
    println!("Usage: stokvel-session <command>");
    println!();
    println!("Commands:");
    println!("  login <username>  - Sign in (password from STOKVEL_PASSWORD or prompt)");
    println!("  whoami            - Show the signed-in identity");
    println!("  validate          - Ask the backend whether the session is valid");
    println!("  token             - Print a valid access token, refreshing if needed");
    println!("  logout            - Sign out and clear the vault");
}
