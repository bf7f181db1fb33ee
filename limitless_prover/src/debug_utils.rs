use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::Serialize;

const DEBUG_FOLDER: &str = "./debug";

/// Name of the file the witness of a failing segment is saved to.
pub fn witness_file_name(module: &str, kind: &str, segment_index: usize) -> String {
    format!("{module}_{kind}_{segment_index}_witness.json")
}

/// Serializes `inputs` to pretty-printed JSON in the debug folder, which is
/// created if needed.
pub fn save_inputs_to_disk<T: Serialize>(file_name: String, inputs: T) -> anyhow::Result<()> {
    let debug_folder = Path::new(DEBUG_FOLDER);

    if !debug_folder.exists() {
        fs::create_dir(debug_folder)?;
    }

    let input_file_path = debug_folder.join(file_name);
    let mut file = File::create(&input_file_path)?;
    let all_inputs_str = serde_json::to_string_pretty(&inputs)?;
    file.write_all(all_inputs_str.as_bytes())?;

    Ok(())
}
