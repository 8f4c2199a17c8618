#![forbid(unsafe_code)]

use ticket_defense_contracts::provider_secrets::ProviderSecretId;
use ticket_defense_engines::device_vault::DeviceVault;

use crate::VaultAction;

/// Runs one vault action and returns what to print. Secret values are never
/// part of the output.
pub fn execute_vault_command(
    vault: &DeviceVault,
    action: &VaultAction,
    value: Option<&str>,
) -> Result<String, String> {
    match action {
        VaultAction::Set { key_id } => {
            let key = parse_provider_secret_id(key_id)?;
            let raw = value.ok_or_else(|| "missing secret input value".to_string())?;
            vault
                .set_secret(key.as_str(), raw)
                .map_err(|e| format!("failed to store {}: {e}", key.as_str()))?;
            tracing::info!(secret = key.as_str(), vault = %vault.vault_path().display(), "secret stored");
            Ok("OK".to_string())
        }
        VaultAction::Has { key_id } => {
            let key = parse_provider_secret_id(key_id)?;
            let has = vault
                .has_secret(key.as_str())
                .map_err(|e| format!("failed to check {}: {e}", key.as_str()))?;
            Ok(if has { "YES" } else { "NO" }.to_string())
        }
        VaultAction::Del { key_id } => {
            let key = parse_provider_secret_id(key_id)?;
            let removed = vault
                .delete_secret(key.as_str())
                .map_err(|e| format!("failed to delete {}: {e}", key.as_str()))?;
            Ok(if removed { "OK" } else { "ABSENT" }.to_string())
        }
        VaultAction::Ls => {
            let keys = vault
                .list_secret_ids()
                .map_err(|e| format!("failed to list keys: {e}"))?;
            Ok(keys
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }
}

pub fn parse_provider_secret_id(raw: &str) -> Result<ProviderSecretId, String> {
    ProviderSecretId::parse(raw).ok_or_else(|| {
        let allowed = ProviderSecretId::allowed_key_names().join(", ");
        format!("unknown key id '{raw}'. allowed: {allowed}")
    })
}
