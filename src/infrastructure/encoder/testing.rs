//! Stand-in encoder for tests: a POSIX shell script run through `/bin/sh`.

use std::path::Path;

use super::FfmpegRunner;

/// Copies the `-i` input (file or stdin) to the last argument (file or stdout).
pub const COPY_SCRIPT: &str = r#"input=""
prev=""
out=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"
  out="$arg"
done
if [ "$input" = "pipe:0" ]; then input=/dev/stdin; fi
if [ "$out" = "pipe:1" ]; then exec cat "$input"; fi
cat "$input" > "$out"
"#;

/// Same as [`COPY_SCRIPT`], except it fails when `token` appears as an
/// argument (e.g. a codec name).
pub fn failing_on(token: &str) -> String {
    guarded_by(token, &format!("echo \"simulated failure in {token}\" >&2; exit 1"))
}

/// Same as [`COPY_SCRIPT`], except it hangs when `token` appears as an
/// argument.
pub fn stalling_on(token: &str) -> String {
    guarded_by(token, "exec sleep 30")
}

fn guarded_by(token: &str, action: &str) -> String {
    format!("case \" $* \" in\n  *\" {token} \"*) {action} ;;\nesac\n{COPY_SCRIPT}")
}

pub fn script_runner(dir: &Path, script: &str) -> FfmpegRunner {
    let path = dir.join("fake-ffmpeg.sh");
    std::fs::write(&path, script).unwrap();
    FfmpegRunner::new("/bin/sh").with_leading_args([path.to_string_lossy().into_owned()])
}
