mod atomic_writer;
mod encoder_probe;
mod ffprobe_info;
mod path_validator;

pub use atomic_writer::{OutputKind, temp_path_for, write_atomic};
pub use encoder_probe::{EncoderCapabilities, probe_capabilities};
pub use ffprobe_info::{VideoInfo, get_video_info};
pub use path_validator::{ensure_directory_exists, validate_file_exists};
