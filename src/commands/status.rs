use chrono::Utc;
use colored::Colorize;

use super::Services;
use crate::auth::{Credential, CredentialSource};
use crate::error::{kind_of, ErrorKind, Result};

/// Print a summary of the stored credential
///
/// Reads the store directly: never refreshes and never starts an
/// authorization session.
pub async fn show_status(services: Services) -> Result<()> {
    println!("\nCredential sources:");
    for source in services.store.sources() {
        match source {
            CredentialSource::Inline(_) => {
                println!("  - {}", "inline credential (config or GOOGLE_TOKEN_JSON)".cyan())
            }
            CredentialSource::File(path) => {
                println!("  - {}", path.display().to_string().cyan())
            }
        }
    }
    println!();

    let credential = match services.store.load().await {
        Ok(Some(credential)) => credential,
        Ok(None) => {
            println!("{}", "Not signed in.".yellow());
            println!("Run {} to authorize.", "google-mcp auth".cyan());
            return Ok(());
        }
        Err(e) if kind_of(&e) == ErrorKind::DataCorruption => {
            println!("{} {:#}", "Stored credential is unreadable:".red(), e);
            println!("Run {} to replace it.", "google-mcp auth".cyan());
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    for line in summarize(
        &credential,
        services.config.auth.refresh_margin(),
        &services.registry.required_scopes(),
    ) {
        println!("{line}");
    }
    println!();
    Ok(())
}

fn summarize(
    credential: &Credential,
    margin: chrono::Duration,
    wanted: &std::collections::BTreeSet<String>,
) -> Vec<String> {
    let remaining = credential.expiry - Utc::now();
    let state = if !credential.is_expiring(margin) {
        format!("valid for {} more minutes", remaining.num_minutes())
            .green()
            .to_string()
    } else if credential.can_refresh() {
        "expired (will refresh on next call)".yellow().to_string()
    } else {
        "expired (re-authorization required)".red().to_string()
    };

    let mut lines = vec![
        format!("Status:        {state}"),
        format!(
            "Expires:       {}",
            credential.expiry.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!(
            "Refresh token: {}",
            if credential.can_refresh() { "present" } else { "absent" }
        ),
        format!("Scopes:        {}", credential.scopes.len()),
    ];
    lines.extend(credential.scopes.iter().map(|scope| format!("  - {scope}")));

    let missing = credential.missing_scopes(wanted);
    if !missing.is_empty() {
        lines.push(format!(
            "{} {}",
            "Missing scopes (some tools will fail):".red(),
            missing.join(", ")
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::parse_scopes;

    fn credential(expires_in: chrono::Duration, refresh: bool) -> Credential {
        Credential {
            access_token: "a".to_string(),
            refresh_token: refresh.then(|| "r".to_string()),
            expiry: Utc::now() + expires_in,
            scopes: parse_scopes("s1 s2"),
            token_type: "Bearer".to_string(),
        }
    }

    #[test]
    fn test_summary_reports_missing_scopes() {
        colored::control::set_override(false);
        let lines = summarize(
            &credential(chrono::Duration::hours(1), true),
            chrono::Duration::seconds(60),
            &parse_scopes("s1 s3"),
        );
        assert!(lines[0].contains("valid for"));
        assert!(lines.iter().any(|l| l.contains("Missing scopes") && l.contains("s3")));
    }

    #[test]
    fn test_summary_expired_states() {
        colored::control::set_override(false);
        let margin = chrono::Duration::seconds(60);
        let wanted = parse_scopes("s1");

        let refreshable = summarize(&credential(chrono::Duration::seconds(-10), true), margin, &wanted);
        assert!(refreshable[0].contains("will refresh"));

        let dead = summarize(&credential(chrono::Duration::seconds(-10), false), margin, &wanted);
        assert!(dead[0].contains("re-authorization required"));
        assert!(dead[2].contains("absent"));
    }
}
