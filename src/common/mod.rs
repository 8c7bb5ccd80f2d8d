pub mod artifacts;
pub mod config_mapping;

pub use artifacts::{
    create_directories, decode_image_base64, encode_image_base64, file_size_kb, load_binary,
    save_binary,
};
pub use config_mapping::{load_json, read_config, save_json, ConfigFormat, ConfigMapping};
