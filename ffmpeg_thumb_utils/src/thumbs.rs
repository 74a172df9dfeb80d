use std::{
    ffi::{OsStr, OsString},
    io::prelude::*,
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    time::{Duration, Instant},
};

#[cfg(target_family = "windows")]
use std::os::windows::process::CommandExt;

use image::GrayImage;
use log::debug;

use crate::{FfmpegError, FfmpegResult};
use FfCommandName::*;

/// Edge length of extracted grayscale thumbnails, in pixels.
pub const THUMB_SIZE: u32 = 16;

/// Number of bytes in one grayscale thumbnail.
pub const THUMB_PIXELS: usize = (THUMB_SIZE * THUMB_SIZE) as usize;

// A stuck decode must not wedge a scan worker forever.
const FF_TIMEOUT_SECS: u64 = 60;

/// Decoder pass-through options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Hardware acceleration mode, passed verbatim to `-hwaccel`.
    pub hw_accel: Option<String>,
    /// Extra arguments inserted after the input file.
    pub custom_args: Vec<String>,
    /// Run ffmpeg at `-loglevel info` and forward its stderr to the log.
    pub verbose: bool,
}

/// Check that both ffmpeg and ffprobe can be executed.
pub fn decoder_is_callable() -> bool {
    run_command(Ffprobe, &[OsString::from("-version")], &ExtractOptions::default()).is_ok()
        && run_command(Ffmpeg, &[OsString::from("-version")], &ExtractOptions::default()).is_ok()
}

/// Extract one grayscale [`THUMB_SIZE`]×[`THUMB_SIZE`] thumbnail per entry of
/// `positions`. Each position is a fraction in `[0, 1]` of `duration_secs`.
///
/// Failure of any single position fails the whole call.
pub fn gray_thumbnails(
    src_path: impl AsRef<Path>,
    positions: &[f64],
    duration_secs: f64,
    opts: &ExtractOptions,
) -> FfmpegResult<Vec<GrayImage>> {
    let src_path = src_path.as_ref();

    let mut thumbs = Vec::with_capacity(positions.len());
    for &position in positions {
        let timestamp = position.clamp(0.0, 1.0) * duration_secs;
        let mut raw = extract_raw_gray_frame(src_path, timestamp, opts)?;

        if raw.len() < THUMB_PIXELS {
            return Err(FfmpegError::NoFrame(timestamp));
        }

        // Rawvideo output is exactly one frame; anything extra is discarded.
        raw.truncate(THUMB_PIXELS);

        let img = GrayImage::from_raw(THUMB_SIZE, THUMB_SIZE, raw)
            .ok_or(FfmpegError::NoFrame(timestamp))?;
        thumbs.push(img);
    }

    Ok(thumbs)
}

/// Extract an encoded (jpeg) color frame at `timestamp_secs`, for display.
pub fn color_thumbnail(
    src_path: impl AsRef<Path>,
    timestamp_secs: f64,
    opts: &ExtractOptions,
) -> FfmpegResult<Vec<u8>> {
    let mut args = common_ffmpeg_args(opts);

    args.extend([
        OsString::from("-ss"),
        OsString::from(format!("{timestamp_secs:.3}")),
        OsString::from("-i"),
        src_path.as_ref().into(),
    ]);
    args.extend(opts.custom_args.iter().map(OsString::from));

    #[rustfmt::skip]
    args.extend([
        OsString::from("-frames:v"), OsString::from("1"),
        OsString::from("-c:v"),      OsString::from("mjpeg"),
        OsString::from("-f"),        OsString::from("image2pipe"),
        OsString::from("-"),
    ]);

    let output = run_command(Ffmpeg, &args, opts)?;
    if output.stdout.is_empty() {
        return Err(FfmpegError::NoFrame(timestamp_secs));
    }

    Ok(output.stdout)
}

fn extract_raw_gray_frame(
    src_path: &Path,
    timestamp_secs: f64,
    opts: &ExtractOptions,
) -> FfmpegResult<Vec<u8>> {
    let mut args = common_ffmpeg_args(opts);

    // Seeking before -i is fast (keyframe seek plus decode to target).
    args.extend([
        OsString::from("-ss"),
        OsString::from(format!("{timestamp_secs:.3}")),
        OsString::from("-i"),
        src_path.into(),
    ]);
    args.extend(opts.custom_args.iter().map(OsString::from));

    let scale_filter = format!("scale={THUMB_SIZE}:{THUMB_SIZE}");
    #[rustfmt::skip]
    args.extend([
        OsString::from("-frames:v"), OsString::from("1"),
        OsString::from("-vf"),       OsString::from(scale_filter),
        OsString::from("-pix_fmt"),  OsString::from("gray"),
        OsString::from("-c:v"),      OsString::from("rawvideo"),
        OsString::from("-f"),        OsString::from("image2pipe"),
        OsString::from("-"),
    ]);

    run_command(Ffmpeg, &args, opts).map(|output| output.stdout)
}

fn common_ffmpeg_args(opts: &ExtractOptions) -> Vec<OsString> {
    let loglevel = if opts.verbose { "info" } else { "warning" };

    #[rustfmt::skip]
    let mut args = vec![
        OsString::from("-hide_banner"),
        OsString::from("-loglevel"), OsString::from(loglevel),
        OsString::from("-nostats"),
    ];

    if let Some(ref mode) = opts.hw_accel {
        args.extend([OsString::from("-hwaccel"), OsString::from(mode)]);
    }

    args
}

pub(crate) fn run_probe_command(src_path: &Path) -> FfmpegResult<String> {
    let args = [
        OsString::from("-v"),
        OsString::from("quiet"),
        OsString::from("-show_format"),
        OsString::from("-show_streams"),
        OsString::from("-print_format"),
        OsString::from("json"),
        src_path.into(),
    ];

    let stdout = run_command(Ffprobe, &args, &ExtractOptions::default())?.stdout;

    String::from_utf8(stdout).map_err(|_| FfmpegError::Utf8Conversion)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FfCommandName {
    Ffprobe,
    Ffmpeg,
}

impl FfCommandName {
    fn as_os_str(self) -> &'static OsStr {
        match self {
            Self::Ffprobe => OsStr::new("ffprobe"),
            Self::Ffmpeg => OsStr::new("ffmpeg"),
        }
    }
}

struct FfOutput {
    stdout: Vec<u8>,
}

fn spawn_command(name: FfCommandName, args: &[OsString]) -> FfmpegResult<Child> {
    let mut command = Command::new(name.as_os_str());
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    //do not spawn a console window when running inside a gui application
    #[cfg(target_family = "windows")]
    command.creation_flags(winapi::um::winbase::CREATE_NO_WINDOW);

    command.spawn().map_err(|e| match e.kind() {
        // The shell failed to execute the command. Separate out NotFound,
        // as by far the most likely cause is ffmpeg not being installed.
        std::io::ErrorKind::NotFound => FfmpegError::FfmpegNotFound,
        _ => FfmpegError::Io(format!("{:?}", e.kind())),
    })
}

fn run_command(name: FfCommandName, args: &[OsString], opts: &ExtractOptions) -> FfmpegResult<FfOutput> {
    let mut child = spawn_command(name, args)?;

    let mut stdout = child.stdout.take().expect("stdout was requested piped");
    let mut stderr = child.stderr.take().expect("stderr was requested piped");

    // Reap the exit status on a watchdog thread so a hung decode cannot
    // block this call past FF_TIMEOUT_SECS.
    let watchdog = std::thread::spawn(move || -> std::io::Result<ExitStatus> {
        let deadline = Instant::now() + Duration::from_secs(FF_TIMEOUT_SECS);
        loop {
            match child.try_wait()? {
                Some(status) => return Ok(status),
                None if Instant::now() > deadline => {
                    let _kill_error = child.kill();
                    let _wait_error = child.wait();
                    return Err(std::io::Error::from(std::io::ErrorKind::TimedOut));
                }
                None => std::thread::sleep(Duration::from_millis(2)),
            }
        }
    });

    // Drain both pipes while the watchdog waits. Draining is what prevents
    // the child from blocking when a pipe buffer fills.
    let mut stdout_acc = vec![];
    let mut stderr_acc = vec![];
    let mut read_buf = [0u8; 4096];

    let mut stdout_done = false;
    let mut stderr_done = false;
    while !(stdout_done && stderr_done) {
        if !stdout_done {
            match stdout.read(&mut read_buf) {
                Err(_) | Ok(0) => stdout_done = true,
                Ok(amount) => stdout_acc.extend_from_slice(&read_buf[..amount]),
            }
        }

        if !stderr_done {
            match stderr.read(&mut read_buf) {
                Err(_) | Ok(0) => stderr_done = true,
                Ok(amount) => stderr_acc.extend_from_slice(&read_buf[..amount]),
            }
        }
    }

    let exit_status = watchdog.join().expect("watchdog thread panicked");

    if opts.verbose && !stderr_acc.is_empty() {
        debug!(target: "ffmpeg", "{}", String::from_utf8_lossy(&stderr_acc));
    }

    match exit_status {
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => Err(FfmpegError::FfmpegNotFound),
            _ => Err(FfmpegError::Io(format!("{:?}", e.kind()))),
        },
        Ok(status) if status.success() => Ok(FfOutput { stdout: stdout_acc }),
        Ok(_) => Err(truncate_err_msg(&stderr_acc)),
    }
}

//sometimes ffmpeg creates very long error messages. Keep the first 500 characters.
fn truncate_err_msg(stderr: &[u8]) -> FfmpegError {
    match std::str::from_utf8(stderr) {
        Ok(error_text) => {
            FfmpegError::FfmpegInternal(error_text.chars().take(500).collect::<String>())
        }
        Err(_) => FfmpegError::Utf8Conversion,
    }
}
