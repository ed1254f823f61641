fn main() {
    // liblxc ships a pkg-config file on every distribution we target; fall
    // back to a plain `-llxc` for cross builds where pkg-config isn't set up.
    if pkg_config::probe_library("lxc").is_err() {
        println!("cargo:rustc-link-lib=dylib=lxc");
    }
    println!("cargo:rerun-if-changed=build.rs");
}

mod pkg_config {
    pub fn probe_library(name: &str) -> Result<(), ()> {
        match std::process::Command::new("pkg-config")
            .args(["--exists", name])
            .status()
        {
            Ok(status) if status.success() => {
                println!("cargo:rustc-link-lib=dylib={name}");
                Ok(())
            }
            _ => Err(()),
        }
    }
}
