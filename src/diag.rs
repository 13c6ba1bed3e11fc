#[cfg(target_arch = "wasm32")]
pub(crate) fn log(message: &str) {
    gloo::console::log!(message.to_string());
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn log(message: &str) {
    eprintln!("{message}");
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn warn(message: &str) {
    gloo::console::warn!(message.to_string());
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn warn(message: &str) {
    eprintln!("{message}");
}
