use std::env;
use std::fs;
use std::path::Path;

const HOST_NAME: &str = "com.ytsummary";

fn main() {
    println!("cargo:rerun-if-env-changed=YTSUMMARY_EXTENSION_ID");

    let workspace_root = Path::new(&env::var("CARGO_MANIFEST_DIR").unwrap())
        .ancestors()
        .nth(1)
        .unwrap()
        .to_path_buf();

    let dev_dir = workspace_root.join(".dev");
    if let Err(e) = fs::create_dir_all(&dev_dir) {
        println!("cargo:warning=Error creating .dev directory: {}", e);
        return;
    }

    let binary_name = format!("native-host{}", env::consts::EXE_SUFFIX);
    let binary_path = workspace_root
        .join("target")
        .join(env::var("PROFILE").unwrap())
        .join(binary_name);

    let extension_id =
        env::var("YTSUMMARY_EXTENSION_ID").unwrap_or_else(|_| "<extension-id>".to_string());

    // Chrome host manifest; the extension id must match the installed extension.
    let manifest = serde_json::json!({
        "name": HOST_NAME,
        "description": "Fetches YouTube transcripts for the YouTube summary extension.",
        "path": binary_path.display().to_string(),
        "type": "stdio",
        "allowed_origins": [format!("chrome-extension://{}/", extension_id)]
    });

    let manifest_path = dev_dir.join(format!("{}.json", HOST_NAME));
    match serde_json::to_string_pretty(&manifest) {
        Ok(contents) => {
            if let Err(e) = fs::write(&manifest_path, contents) {
                println!("cargo:warning=Failed to write {}: {}", manifest_path.display(), e);
            }
        }
        Err(e) => println!("cargo:warning=Failed to render host manifest: {}", e),
    }
}
