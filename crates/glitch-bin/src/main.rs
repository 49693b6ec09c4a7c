use clap::{Parser, Subcommand, ValueEnum};
use glitch_client::glitch_types::{
    FramePipelineDyn, FramePipelineDynMut, FramePipelineOptions, GlitchLibError, OutputLayout,
    ReadStatus,
};
use glitch_client::{load, GlitchClient};
use log::{info, warn};
use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use turbojpeg::{Compressor, Image, PixelFormat, Subsamp};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    Bgr,
    Rgb,
    Rgba,
}

impl From<Layout> for OutputLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Bgr => OutputLayout::Bgr24,
            Layout::Rgb => OutputLayout::Rgb24,
            Layout::Rgba => OutputLayout::Rgba,
        }
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Print the hardware backends available on this host.
    ListAccelerators,
    /// Decode a video and write sampled frames as images.
    Export {
        input: String,
        output_dir: PathBuf,
        /// Hardware backend to request, e.g. cuda or vaapi.
        #[arg(long, default_value = "")]
        hw: String,
        /// Corrupt every packet before decoding.
        #[arg(long)]
        touch: bool,
        /// Write every Nth decoded frame.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        every: u64,
        #[arg(long, value_enum, default_value_t = ImageFormat::Jpeg)]
        format: ImageFormat,
        #[arg(long, value_enum, default_value_t = Layout::Bgr)]
        layout: Layout,
        /// JPEG quality, 1 to 100.
        #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(i32).range(1..=100))]
        quality: i32,
        /// Corruption seed, for reproducible glitches.
        #[arg(long)]
        seed: Option<u64>,
        /// Stop after this many decoded frames.
        #[arg(long)]
        max_frames: Option<u64>,
    },
}

#[derive(Parser)]
#[command(name = "make-it-glitch", about = "Decode video through a glitching pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

struct ExportOptions {
    touch: bool,
    every: u64,
    format: ImageFormat,
    layout: OutputLayout,
    quality: i32,
    max_frames: Option<u64>,
}

/// A borrowed view of one output frame.
struct FrameView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
    layout: OutputLayout,
}

impl FrameView<'_> {
    fn row_bytes(&self) -> usize {
        self.width * self.layout.bytes_per_pixel()
    }

    /// Packed RGB(A) rows without padding.
    fn to_packed_rgb(&self) -> Vec<u8> {
        let bpp = self.layout.bytes_per_pixel();
        let mut packed = Vec::with_capacity(self.row_bytes() * self.height);
        for row in self.data.chunks(self.stride).take(self.height) {
            let row = &row[..self.row_bytes()];
            match self.layout {
                OutputLayout::Bgr24 => {
                    for pixel in row.chunks(bpp) {
                        packed.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
                    }
                }
                OutputLayout::Rgb24 | OutputLayout::Rgba => packed.extend_from_slice(row),
            }
        }
        packed
    }
}

fn jpeg_pixel_format(layout: OutputLayout) -> PixelFormat {
    match layout {
        OutputLayout::Bgr24 => PixelFormat::BGR,
        OutputLayout::Rgb24 => PixelFormat::RGB,
        OutputLayout::Rgba => PixelFormat::RGBA,
    }
}

fn get_jpeg_buffer(frame: &FrameView, quality: i32) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut compressor = Compressor::new()?;
    compressor.set_quality(quality)?;
    compressor.set_subsamp(Subsamp::Sub2x2)?;

    let image = Image {
        pixels: frame.data,
        width: frame.width,
        pitch: frame.stride,
        height: frame.height,
        format: jpeg_pixel_format(frame.layout),
    };
    Ok(compressor.compress_to_vec(image)?)
}

fn write_frame(
    frame: &FrameView,
    path: &Path,
    format: ImageFormat,
    quality: i32,
) -> Result<(), Box<dyn Error>> {
    match format {
        ImageFormat::Jpeg => fs::write(path, get_jpeg_buffer(frame, quality)?)?,
        ImageFormat::Png => {
            let color = match frame.layout {
                OutputLayout::Rgba => image::ColorType::Rgba8,
                OutputLayout::Bgr24 | OutputLayout::Rgb24 => image::ColorType::Rgb8,
            };
            image::save_buffer(
                path,
                &frame.to_packed_rgb(),
                frame.width as u32,
                frame.height as u32,
                color,
            )?;
        }
    }
    Ok(())
}

fn lib_path() -> PathBuf {
    let lib_name = if cfg!(target_os = "windows") {
        "glitch_lib.dll"
    } else if cfg!(target_os = "macos") {
        "libglitch_lib.dylib"
    } else {
        "libglitch_lib.so"
    };

    let default_lib_path = PathBuf::from("./target/debug").join(lib_name);
    env::var("GLITCH_LIB_PATH")
        .map(PathBuf::from)
        .unwrap_or(default_lib_path)
}

fn print_accelerators(accelerators: &[String]) {
    if accelerators.is_empty() {
        println!("No hardware accelerators available");
    } else {
        println!("Hardware accelerators: {}", accelerators.join(", "));
    }
}

fn export(
    client: &GlitchClient,
    input: &str,
    output_dir: &Path,
    options: FramePipelineOptions,
    settings: ExportOptions,
) -> Result<(), Box<dyn Error>> {
    let original_dir = output_dir.join("original");
    let glitchy_dir = output_dir.join("glitchy");
    fs::create_dir_all(&original_dir)?;
    fs::create_dir_all(&glitchy_dir)?;
    let target_dir = if settings.touch { glitchy_dir } else { original_dir };

    let mut pipeline = client.open(input, options);
    print_accelerators(&client.accelerators());
    println!("Pipeline valid: {}", pipeline.is_valid());
    println!("Hardware accelerated: {}", pipeline.is_accelerated());
    println!(
        "Frame geometry: {}x{} (stride {})",
        pipeline.get_width(),
        pipeline.get_height(),
        pipeline.get_stride()
    );

    let mut frames = 0u64;
    let mut written = 0u64;
    loop {
        match pipeline.read(settings.touch) {
            ReadStatus::FrameReady => {}
            ReadStatus::Retry => continue,
            ReadStatus::EndOfStream => break,
            ReadStatus::Fatal => {
                let error: Option<GlitchLibError> = pipeline.last_error().into();
                return Err(match error {
                    Some(e) => e.into(),
                    None => "Pipeline reported a fatal error".into(),
                });
            }
        }

        if frames % settings.every == 0 {
            let ptr = pipeline.data_ptr();
            if ptr.is_null() {
                return Err("Pipeline has no output buffer".into());
            }
            // Valid until the next read on this pipeline.
            let data = unsafe { std::slice::from_raw_parts(ptr, pipeline.data_len()) };
            let frame = FrameView {
                data,
                width: pipeline.get_width() as usize,
                height: pipeline.get_height() as usize,
                stride: pipeline.get_stride(),
                layout: settings.layout,
            };
            let path = target_dir.join(format!("{}.{}", frames, settings.format.extension()));
            write_frame(&frame, &path, settings.format, settings.quality)?;
            written += 1;
        }

        frames += 1;
        if settings.max_frames.map_or(false, |max| frames >= max) {
            info!("Reached frame limit of {}", frames);
            break;
        }
    }

    println!(
        "Decoded {} frames, wrote {} images to {}",
        frames,
        written,
        target_dir.display()
    );
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let lib_path = lib_path();
    let client = load(&lib_path)?;

    match cli.command {
        Command::ListAccelerators => print_accelerators(&client.accelerators()),
        Command::Export {
            input,
            output_dir,
            hw,
            touch,
            every,
            format,
            layout,
            quality,
            seed,
            max_frames,
        } => {
            println!("Exporting frames from {} to {}", input, output_dir.display());
            if !hw.is_empty() && !client.accelerators().contains(&hw) {
                warn!("Backend {} is not available here, decoding in software", hw);
            }

            let options = FramePipelineOptions {
                hw_backend: hw.as_str().into(),
                output_layout: layout.into(),
                seed: seed.into(),
            };
            let export_options = ExportOptions {
                touch,
                every,
                format,
                layout: layout.into(),
                quality,
                max_frames,
            };
            export(&client, &input, &output_dir, options, export_options)?;
        }
    }
    Ok(())
}

fn main() {
    let _ = pretty_env_logger::try_init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_bgr_rows_as_rgb() {
        // 2x2 BGR with 8-byte stride
        let data = [
            1, 2, 3, 4, 5, 6, 0, 0, //
            7, 8, 9, 10, 11, 12, 0, 0,
        ];
        let frame = FrameView {
            data: &data,
            width: 2,
            height: 2,
            stride: 8,
            layout: OutputLayout::Bgr24,
        };
        assert_eq!(
            frame.to_packed_rgb(),
            vec![3, 2, 1, 6, 5, 4, 9, 8, 7, 12, 11, 10]
        );
    }

    #[test]
    fn packs_rgba_rows_without_padding() {
        let data = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        let frame = FrameView {
            data: &data,
            width: 1,
            height: 2,
            stride: 8,
            layout: OutputLayout::Rgba,
        };
        assert_eq!(frame.to_packed_rgb(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn parses_export_arguments() {
        let cli = Cli::try_parse_from([
            "make-it-glitch",
            "export",
            "in.mkv",
            "out",
            "--touch",
            "--every",
            "5",
            "--format",
            "png",
            "--max-frames",
            "100",
        ])
        .expect("parse");
        match cli.command {
            Command::Export {
                touch,
                every,
                format,
                layout,
                max_frames,
                ..
            } => {
                assert!(touch);
                assert_eq!(every, 5);
                assert_eq!(format, ImageFormat::Png);
                assert_eq!(layout, Layout::Bgr);
                assert_eq!(max_frames, Some(100));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn rejects_zero_sampling_interval() {
        let parsed = Cli::try_parse_from(["make-it-glitch", "export", "a", "b", "--every", "0"]);
        assert!(parsed.is_err());
    }
}
