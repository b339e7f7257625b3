//! IDE library paths from the Windows registry.
//!
//! RAD Studio keeps its per-platform library configuration under
//! `HKCU\<product key>\Library\<platform>`. The `Browsing Path` value lists
//! the RTL/VCL source directories, which are what a debugger needs to step
//! into library units. The value is read through `reg.exe` so no Windows-only
//! dependency is needed; anywhere `reg.exe` is missing the list is empty.

use std::collections::HashMap;

use log::{debug, warn};
use tokio::process::Command;

use crate::project::expand_vars;

pub const BROWSING_PATH: &str = "Browsing Path";

/// Full key path for a platform's library settings.
pub fn library_key(product_key: &str, platform: &str) -> String {
    let key = product_key.trim_matches('\\');
    let rooted = ["HKEY_", "HKCU\\", "HKLM\\"]
        .iter()
        .any(|prefix| key.to_ascii_uppercase().starts_with(prefix));
    if rooted {
        format!("{key}\\Library\\{platform}")
    } else {
        format!("HKCU\\{key}\\Library\\{platform}")
    }
}

/// Pull a value's data out of `reg query` output:
///
/// ```text
/// HKEY_CURRENT_USER\Software\Embarcadero\BDS\22.0\Library\Win32
///     Browsing Path    REG_SZ    $(BDS)\SOURCE\VCL;$(BDS)\source\rtl\common
/// ```
pub fn parse_query_output(output: &str, value_name: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(value_name)?;
        let rest = rest.trim_start();
        let data = rest
            .strip_prefix("REG_EXPAND_SZ")
            .or_else(|| rest.strip_prefix("REG_SZ"))?;
        Some(data.trim().to_string())
    })
}

/// Browsing-path entries for `platform`, with `$(BDS)`-style references
/// expanded from `vars` and `$(Platform)` from `platform`.
pub async fn browsing_paths(
    product_key: &str,
    platform: &str,
    vars: &HashMap<String, String>,
) -> Vec<String> {
    let key = library_key(product_key, platform);
    let output = match Command::new("reg")
        .args(["query", &key, "/v", BROWSING_PATH])
        .output()
        .await
    {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            warn!("no {BROWSING_PATH} under {key} (reg exited with {})", output.status);
            return Vec::new();
        }
        Err(e) => {
            warn!("cannot query the registry for library paths: {e}");
            return Vec::new();
        }
    };

    let text = String::from_utf8_lossy(&output.stdout);
    let Some(data) = parse_query_output(&text, BROWSING_PATH) else {
        warn!("unexpected reg output for {key}");
        return Vec::new();
    };

    let mut vars = vars.clone();
    vars.insert("Platform".to_string(), platform.to_string());
    let entries = split_path_list(&data, &vars);
    debug!("{} library browsing path(s) for {platform}", entries.len());
    entries
}

fn split_path_list(data: &str, vars: &HashMap<String, String>) -> Vec<String> {
    data.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| expand_vars(entry, vars))
        .collect()
}
