//! Fake separation tools for pipeline tests
//!
//! Each script is run as `sh <script> -n <model> -o <output_root> <input>`, mirroring the
//! real tool's arguments.

use std::path::Path;
use stemdeck_common::config::SeparationConfig;

/// Writes four non-empty stems where the real tool would
pub const FAKE_TOOL: &str = r#"model="$2"
out="$4"
input="$5"
name=$(basename "$input")
dir="$out/$model/${name%.*}"
mkdir -p "$dir"
for stem in vocals drums bass other; do
    printf 'RIFF-%s' "$stem" > "$dir/$stem.wav"
done
"#;

/// Like [`FAKE_TOOL`], but takes a second before writing anything
pub const SLOW_TOOL: &str = r#"sleep 1
model="$2"
out="$4"
input="$5"
name=$(basename "$input")
dir="$out/$model/${name%.*}"
mkdir -p "$dir"
for stem in vocals drums bass other; do
    printf 'RIFF-%s' "$stem" > "$dir/$stem.wav"
done
"#;

/// Creates its output directory but leaves it empty
pub const EMPTY_TOOL: &str = r#"model="$2"
out="$4"
input="$5"
name=$(basename "$input")
mkdir -p "$out/$model/${name%.*}"
"#;

/// Fails like a tool that cannot load its model
pub const FAILING_TOOL: &str = "echo 'separation failed' >&2\nexit 2\n";

/// Reports success but writes nothing
pub const SILENT_TOOL: &str = "exit 0\n";

/// Writes a half-finished output directory, then fails
pub const PARTIAL_TOOL: &str = r#"model="$2"
out="$4"
input="$5"
name=$(basename "$input")
dir="$out/$model/${name%.*}"
mkdir -p "$dir"
printf 'RIFF' > "$dir/vocals.wav"
exit 1
"#;

/// Separation settings that run `script` through `sh`
pub fn fake_separation(dir: &Path, script: &str, purge_failed_jobs: bool) -> SeparationConfig {
    let script_path = dir.join("fake_tool.sh");
    std::fs::write(&script_path, script).expect("write fake tool");
    SeparationConfig {
        program: "sh".to_string(),
        args: vec![script_path.to_string_lossy().into_owned()],
        purge_failed_jobs,
        ..Default::default()
    }
}
