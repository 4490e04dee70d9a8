//! Shared fixtures for unit tests: an executable stand-in for yt-dlp.

use std::{fs, path::PathBuf, sync::OnceLock};

/// Behaviour is keyed on the URL: `fail` exits 3, `slow` hangs, `nofile`
/// exits cleanly without writing anything, `latin1` prints non-UTF-8 bytes
/// before succeeding. Everything else succeeds with a video titled
/// "Test Title".
const STUB_SCRIPT: &str = r#"#!/usr/bin/env bash
set -u
info=0
audio=0
template=""
url=""
while [ $# -gt 0 ]; do
  case "$1" in
    --dump-json) info=1 ;;
    -x) audio=1 ;;
    -o) shift; template="$1" ;;
    --audio-format|--audio-quality|-f) shift ;;
    *) url="$1" ;;
  esac
  shift
done

case "$url" in
  *fail*)
    echo "ERROR: [youtube] stub failure" >&2
    exit 3
    ;;
  *slow*)
    echo "[youtube] waiting"
    exec sleep 30
    ;;
esac

id="${url##*v=}"
id="${id%%&*}"

if [ "$info" -eq 1 ]; then
  echo "WARNING: stub notice" >&2
  printf '{"id":"%s","title":"Test Title","description":"A stub video","thumbnail":"https://img.example/%s.jpg","duration":61.4,"uploader":"Uploader"}\n' "$id" "$id"
  exit 0
fi

echo "[youtube] $id: Downloading webpage"
case "$url" in
  *latin1*)
    printf '[download] caf\xe9 title\n'
    printf 'WARNING: caf\xe9\n' >&2
    ;;
esac
case "$url" in
  *nofile*)
    echo "[download] 100% of 1.00KiB"
    exit 0
    ;;
esac

if [ "$audio" -eq 1 ]; then ext="mp3"; else ext="mp4"; fi
out=$(printf '%s' "$template" | sed -e 's/%(title)s/Test Title/' -e "s/%(ext)s/$ext/")
dir=$(dirname "$out")

echo "[download] Destination: $dir/Test Title.webm"
echo "[download]  10.0% of 1.00MiB at 512.00KiB/s ETA 00:02"
echo "WARNING: stub stderr line" >&2
echo "[download]  55.5% of 1.00MiB at 1.00MiB/s ETA 00:01"
echo "[download] 100% of 1.00MiB in 00:00:01"
if [ "$audio" -eq 1 ]; then
  echo "[ExtractAudio] Destination: $out"
fi
printf 'stub media' > "$out"
exit 0
"#;

/// Installs the stub once per test process and returns its path.
pub fn extractor_stub() -> PathBuf {
    static STUB: OnceLock<PathBuf> = OnceLock::new();
    STUB.get_or_init(|| {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("vidgrab-stub-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("yt-dlp");
        fs::write(&path, STUB_SCRIPT).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    })
    .clone()
}
