#[cfg(test)]
pub(crate) fn target_dir() -> std::path::PathBuf {
    use std::path::PathBuf;

    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../target")
        .join("debug")
}

/// Path of the built glitch-lib shared object, if it has been built.
#[cfg(test)]
pub(crate) fn get_glitch_lib() -> Option<std::path::PathBuf> {
    if let Ok(path) = std::env::var("GLITCH_LIB_PATH") {
        return Some(std::path::PathBuf::from(path));
    }

    let lib_name = {
        #[cfg(target_os = "windows")]
        {
            "glitch_lib.dll"
        }
        #[cfg(target_os = "macos")]
        {
            "libglitch_lib.dylib"
        }
        #[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
        {
            "libglitch_lib.so"
        }
    };
    let full_path = target_dir().join(lib_name);
    full_path.exists().then_some(full_path)
}
