//! Map-to-PDB conversion with the external `map2pdb` tool.

use std::path::Path;

use log::info;

use crate::process::{self, CommandSpec, ProcessError, ProcessOutput};
use crate::reporter::Reporter;

/// Converter used when the settings name none.
pub const DEFAULT_CONVERTER: &str = "map2pdb.exe";

/// `<converter> -bind <map file>`, run from the map file's directory.
pub fn convert_command(converter: &str, map_file: &Path) -> CommandSpec {
    let spec = CommandSpec::new(converter)
        .arg("-bind")
        .arg(map_file.to_string_lossy());
    match map_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => spec.current_dir(dir),
        _ => spec,
    }
}

/// Produce a PDB for the executable next to `map_file` and bind it.
pub async fn convert(
    converter: &str,
    map_file: &Path,
    reporter: &dyn Reporter,
) -> Result<ProcessOutput, ProcessError> {
    info!("converting {} to PDB", map_file.display());
    process::run_streamed(&convert_command(converter, map_file), reporter).await
}
