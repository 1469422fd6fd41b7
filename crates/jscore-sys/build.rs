use std::env;
use std::fs;
use std::path::{Path, PathBuf};

// bun-webkit release from oven-sh/WebKit used for the static Linux/Windows link
const BUN_WEBKIT_VERSION: &str = "aaf3f80b1cc701b412f8abfb7c7f413644a229ff";

fn main() {
    println!("cargo:rustc-check-cfg=cfg(has_bmalloc)");
    println!("cargo:rerun-if-env-changed=BUN_WEBKIT_VERSION");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap();
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap();

    match target_os.as_str() {
        "macos" | "ios" => configure_apple(),
        "linux" if env::var_os("CARGO_FEATURE_SYSTEM_JSC").is_some() => configure_system_linux(),
        "linux" => configure_bun_webkit("linux", linux_arch(&target_arch)),
        "windows" => configure_windows(&target_arch),
        _ => panic!("Unsupported OS for JavaScriptCore: {}", target_os),
    }
}

fn configure_apple() {
    // The system framework ships the C API
    println!("cargo:rustc-link-lib=framework=JavaScriptCore");

    if let Ok(sdk_path) = std::process::Command::new("xcrun")
        .args(["--show-sdk-path"])
        .output()
    {
        let sdk_path = String::from_utf8_lossy(&sdk_path.stdout);
        println!(
            "cargo:rustc-link-search=framework={}/System/Library/Frameworks",
            sdk_path.trim()
        );
    }
}

fn configure_system_linux() {
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");

    let package = ["javascriptcoregtk-4.1", "javascriptcoregtk-4.0"]
        .into_iter()
        .find(|name| pkg_config::probe_library(name).is_ok())
        .unwrap_or_else(|| {
            panic!(
                "JavaScriptCore not found via pkg-config. Install with:\n\
                 Ubuntu/Debian: sudo apt-get install libjavascriptcoregtk-4.1-dev\n\
                 Fedora: sudo dnf install webkit2gtk4.1-devel"
            )
        });

    let lib = pkg_config::Config::new()
        .atleast_version("2.30")
        .probe(package)
        .expect("Failed to configure JavaScriptCore via pkg-config");

    for path in lib.include_paths {
        println!("cargo:include={}", path.display());
    }
}

fn linux_arch(target_arch: &str) -> &'static str {
    match target_arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        _ => panic!("Unsupported architecture for bun-webkit: {}", target_arch),
    }
}

fn configure_windows(target_arch: &str) {
    if target_arch != "x86_64" {
        panic!("Unsupported architecture for Windows bun-webkit: {}", target_arch);
    }

    configure_bun_webkit("windows", "amd64");

    for lib in [
        "winmm", "bcrypt", "ntdll", "userenv", "dbghelp", "crypt32", "wsock32", "ws2_32",
        "advapi32", "ole32", "oleaut32", "uuid", "shell32",
    ] {
        println!("cargo:rustc-link-lib={}", lib);
    }

    // JSC needs the dynamic MSVC runtime
    println!("cargo:rustc-link-arg=/NODEFAULTLIB:libcmt");
    println!("cargo:rustc-link-lib=msvcrt");
}

fn configure_bun_webkit(os: &str, arch: &str) {
    let webkit_path = download_bun_webkit(os, arch);
    let lib_dir = find_lib_dir(&webkit_path);

    println!("cargo:rustc-link-search=native={}", lib_dir.display());
    println!("cargo:rustc-link-lib=static=JavaScriptCore");
    println!("cargo:rustc-link-lib=static=WTF");

    // Some Windows archives fold bmalloc into WTF
    if lib_exists(&lib_dir, "bmalloc") {
        println!("cargo:rustc-link-lib=static=bmalloc");
        println!("cargo:rustc-cfg=has_bmalloc");
    }

    // Windows archives use the "sicu*" naming
    if lib_exists(&lib_dir, "icudata") {
        for lib in ["icudata", "icui18n", "icuuc"] {
            println!("cargo:rustc-link-lib=static={}", lib);
        }
    } else if lib_exists(&lib_dir, "sicudt") {
        for lib in ["sicudt", "sicuin", "sicuuc"] {
            println!("cargo:rustc-link-lib=static={}", lib);
        }
    } else {
        println!(
            "cargo:warning=ICU libraries not found in {}",
            lib_dir.display()
        );
    }

    if os == "linux" {
        for lib in ["stdc++", "atomic", "dl", "pthread", "m"] {
            println!("cargo:rustc-link-lib={}", lib);
        }
    }

    let include_dir = webkit_path.join("include");
    if include_dir.exists() {
        println!("cargo:include={}", include_dir.display());
    }
}

fn download_bun_webkit(os: &str, arch: &str) -> PathBuf {
    let version =
        env::var("BUN_WEBKIT_VERSION").unwrap_or_else(|_| BUN_WEBKIT_VERSION.to_string());

    let webkit_dir = cache_dir().join(&version).join(format!("{}-{}", os, arch));
    let marker = webkit_dir.join(".downloaded");
    if marker.exists() {
        return webkit_dir;
    }

    let url = format!(
        "https://github.com/oven-sh/WebKit/releases/download/autobuild-{}/bun-webkit-{}-{}.tar.gz",
        version, os, arch
    );
    println!("cargo:warning=Downloading bun-webkit from {}", url);

    fs::create_dir_all(&webkit_dir).expect("Failed to create bun-webkit cache directory");

    // Stream straight into the decoder, the archive is several hundred MB
    let response = ureq::get(&url)
        .call()
        .unwrap_or_else(|e| panic!("Failed to download bun-webkit: {}. URL: {}", e, url));
    let reader = response.into_body().into_reader();
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(reader));
    archive
        .unpack(&webkit_dir)
        .expect("Failed to extract bun-webkit archive");

    fs::write(&marker, "").expect("Failed to create marker file");
    webkit_dir
}

fn find_lib_dir(webkit_path: &Path) -> PathBuf {
    let direct = webkit_path.join("lib");
    if direct.exists() {
        return direct;
    }

    // Archives usually unpack into a single top-level directory
    fs::read_dir(webkit_path)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path().join("lib"))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| webkit_path.to_path_buf())
}

fn lib_exists(lib_dir: &Path, lib_name: &str) -> bool {
    let prefixed = format!("lib{}", lib_name);
    fs::read_dir(lib_dir)
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .any(|name| {
            (name.starts_with(lib_name) || name.starts_with(&prefixed))
                && (name.ends_with(".lib") || name.ends_with(".a"))
        })
}

fn cache_dir() -> PathBuf {
    if let Ok(cargo_home) = env::var("CARGO_HOME") {
        return PathBuf::from(cargo_home).join("cache").join("bun-webkit");
    }

    if let Some(home) = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
        return PathBuf::from(home)
            .join(".cargo")
            .join("cache")
            .join("bun-webkit");
    }

    PathBuf::from(env::var("OUT_DIR").unwrap()).join("bun-webkit-cache")
}
