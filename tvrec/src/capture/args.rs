//! ffmpeg argument construction.

use std::path::Path;

/// Output shape of a local capture, chosen only from the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerHint {
    /// MP4 family: copy video, transcode audio to AAC.
    Mp4,
    /// MPEG-TS: copy every stream unchanged. Used for any other extension.
    MpegTs,
}

impl ContainerHint {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("mp4" | "m4v" | "mov") => Self::Mp4,
            _ => Self::MpegTs,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::MpegTs => "mpegts",
        }
    }

    fn output_args(&self) -> &'static [&'static str] {
        match self {
            Self::Mp4 => &[
                "-c:v",
                "copy",
                "-c:a",
                "aac",
                "-b:a",
                "192k",
                "-movflags",
                "+faststart",
                "-f",
                "mp4",
            ],
            Self::MpegTs => &["-c", "copy", "-f", "mpegts"],
        }
    }
}

impl std::fmt::Display for ContainerHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the ffmpeg command line for capturing `stream_url` into `output_path`.
///
/// `extra_input_args` are inserted right before `-i`.
pub fn build_capture_args(
    stream_url: &str,
    output_path: &Path,
    hint: ContainerHint,
    extra_input_args: &[String],
) -> Vec<String> {
    let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "warning"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    args.extend(
        ["-analyzeduration", "10M", "-probesize", "10M"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.extend(extra_input_args.iter().cloned());
    args.extend(["-i".to_string(), stream_url.to_string()]);

    args.extend(hint.output_args().iter().map(|s| s.to_string()));
    args.push(output_path.to_string_lossy().to_string());

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn container_follows_extension_only() {
        assert_eq!(ContainerHint::from_path(Path::new("/r/a.mp4")), ContainerHint::Mp4);
        assert_eq!(ContainerHint::from_path(Path::new("/r/a.MP4")), ContainerHint::Mp4);
        assert_eq!(ContainerHint::from_path(Path::new("/r/a.ts")), ContainerHint::MpegTs);
        assert_eq!(ContainerHint::from_path(Path::new("/r/a.mkv")), ContainerHint::MpegTs);
        assert_eq!(ContainerHint::from_path(Path::new("/r/noext")), ContainerHint::MpegTs);
    }

    #[test]
    fn ts_capture_copies_all_streams() {
        let out = PathBuf::from("/tmp/news1.ts");
        let args = build_capture_args("http://tvh/stream/channel/1", &out, ContainerHint::MpegTs, &[]);

        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "http://tvh/stream/channel/1");
        assert_eq!(&args[i + 2..], ["-c", "copy", "-f", "mpegts", "/tmp/news1.ts"]);
        assert!(args.iter().position(|a| a == "-probesize").unwrap() < i);
        assert_eq!(args[0], "-y");
    }

    #[test]
    fn mp4_capture_transcodes_audio() {
        let out = PathBuf::from("/tmp/show.mp4");
        let args = build_capture_args("http://x/s", &out, ContainerHint::Mp4, &[]);

        let joined = args.join(" ");
        assert!(joined.contains("-c:v copy -c:a aac -b:a 192k -movflags +faststart -f mp4"));
        assert_eq!(args.last().unwrap(), "/tmp/show.mp4");
    }

    #[test]
    fn extra_input_args_precede_input() {
        let extra = vec!["-rw_timeout".to_string(), "5000000".to_string()];
        let args = build_capture_args("http://x/s", Path::new("a.ts"), ContainerHint::MpegTs, &extra);

        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i - 2], "-rw_timeout");
        assert_eq!(args[i - 1], "5000000");
    }
}
