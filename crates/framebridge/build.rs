fn main() {
    for (source, exported) in [
        ("TARGET", "FRAMEBRIDGE_BUILD_TARGET"),
        ("PROFILE", "FRAMEBRIDGE_BUILD_PROFILE"),
    ] {
        if let Ok(value) = std::env::var(source) {
            println!("cargo:rustc-env={exported}={value}");
        }
        println!("cargo:rerun-if-env-changed={source}");
    }
}
