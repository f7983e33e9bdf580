use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Embed the Windows manifest (SendInput into an elevated game needs matching privileges)
    let _ = embed_resource::compile("ngu-automation.rc", embed_resource::NONE);

    copy_config();
}

/// Copies config.json to the target directory so the executable finds it next to itself.
fn copy_config() {
    let Ok(out_dir) = env::var("OUT_DIR") else {
        return;
    };
    // OUT_DIR is something like target/release/build/ngu-automation-xxx/out
    // Go up 3 levels: out -> hash -> build -> release
    let Some(target_dir) = Path::new(&out_dir).ancestors().nth(3) else {
        return;
    };

    let config_src = Path::new("config.json");
    let config_dst = target_dir.join("config.json");

    if config_src.exists() {
        let _ = fs::copy(config_src, &config_dst);
        println!("cargo:rerun-if-changed=config.json");
    }
}
