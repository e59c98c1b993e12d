use std::ffi::OsString;
use std::path::Path;

/// Arguments for muxing: keep the first video stream of `video` untouched,
/// take the first audio stream from `audio`, stop at the shorter input and
/// overwrite `output`.
pub fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(14);
    args.push("-y".into());
    args.push("-i".into());
    args.push(video.into());
    args.push("-i".into());
    args.push(audio.into());
    args.push("-c:v".into());
    args.push("copy".into());
    args.push("-map".into());
    args.push("0:v:0".into());
    args.push("-map".into());
    args.push("1:a:0".into());
    args.push("-shortest".into());
    args.push(output.into());
    args
}
