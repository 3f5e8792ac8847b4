use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use tempfile::TempDir;

use qrcode_provider::framework::diag::Diagnostics;
use qrcode_provider::framework::Object;
use qrcode_provider::helper::sha256_hex;
use qrcode_provider::{ProviderService, QrCodeProvider};

const TYPE_NAME: &str = "qrcode_generate";

struct Host {
    service: ProviderService,
}

impl Host {
    fn new() -> Self {
        Self {
            service: ProviderService::new(QrCodeProvider::new("test")),
        }
    }

    fn read_ascii(&self, config: Value) -> Object {
        let mut diags = Diagnostics::default();
        let state = self.service.read_data(TYPE_NAME, &object(config), &mut diags).unwrap();
        assert!(!diags.has_error(), "{diags:?}");
        state.unwrap()
    }

    fn read_ascii_errors(&self, config: Value) -> Diagnostics {
        let mut diags = Diagnostics::default();
        let state = self.service.read_data(TYPE_NAME, &object(config), &mut diags).unwrap();
        assert!(state.is_none());
        diags
    }

    /// Plans and applies `config` on top of `prior`, like `terraform apply`.
    fn apply(&self, prior: Option<&Object>, config: Value) -> Object {
        let config = object(config);
        let mut diags = Diagnostics::default();
        let planned = self
            .service
            .plan_change(TYPE_NAME, prior, Some(&config), &config, &BTreeSet::new(), &mut diags)
            .unwrap();
        assert!(!diags.has_error(), "{diags:?}");
        self.service
            .apply_change(TYPE_NAME, prior, planned.state.as_ref())
            .unwrap()
            .unwrap()
    }

    fn refresh(&self, state: &Object) -> Option<Object> {
        self.service.refresh(TYPE_NAME, state).unwrap()
    }
}

fn object(value: Value) -> Object {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn file_sha256(path: &Path) -> String {
    sha256_hex(fs::read(path).unwrap())
}

#[test]
fn data_source_options() {
    let host = Host::new();
    let plain = host.read_ascii(json!({"text": "qrcode"}));
    let ascii = plain["ascii"].as_str().unwrap();
    assert_eq!(plain["ascii_sha256"], json!(sha256_hex(ascii)));
    assert_eq!(
        plain["ascii_sha256"],
        json!("1008c2f94d40f67e0f9f212284e9535aff2919fb256d512ad5edfa02929b55a5")
    );

    let lowercase = host.read_ascii(json!({"text": "qrcode", "error_correction": "m"}));
    assert_eq!(lowercase["ascii"], plain["ascii"]);

    let hidden = host.read_ascii(json!({"sensitive_text": "qrcode"}));
    assert_eq!(hidden["ascii_sha256"], plain["ascii_sha256"]);

    let borderless = host.read_ascii(json!({"text": "qrcode", "disable_border": true}));
    assert!(borderless["ascii"].as_str().unwrap().lines().count() < ascii.lines().count());
}

#[test]
fn data_source_rejects_bad_input() {
    let host = Host::new();
    let cases = [
        (json!({"text": "a", "error_correction": "X"}), "Invalid Error Correction Level"),
        (json!({"text": "a", "sensitive_text": "a"}), "Invalid Attribute Combination"),
        (json!({}), "Missing Attribute Configuration"),
        (json!({"text": "a", "ascii": "x"}), "Invalid Configuration for Read-Only Attribute"),
        (json!({"text": "a", "invert": "yes"}), "Incorrect attribute value type"),
        (json!({"text": "a", "color": "red"}), "Unsupported argument"),
    ];
    for (config, summary) in cases {
        let diags = host.read_ascii_errors(config.clone());
        assert!(diags.iter().any(|d| d.summary == summary), "{config}: {diags:?}");
    }
}

#[test]
fn schema_marks_sensitive_text() {
    let host = Host::new();
    for schemas in [host.service.data_source_schemas(), host.service.resource_schemas()] {
        let attributes = &schemas[TYPE_NAME].attributes;
        assert!(attributes["sensitive_text"].sensitive);
        assert!(!attributes["text"].sensitive);
    }
}

#[test]
fn resource_lifecycle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("codes/qr.png");
    let file = path.to_str().unwrap();
    let host = Host::new();

    // Create
    let state = host.apply(None, json!({"text": "qrcode", "file": file}));
    assert_eq!(state["sha256"], json!(file_sha256(&path)));
    assert_eq!(
        state["sha256"],
        json!("da3a74018e5904b1cb789fa94363e5ec35facb82ee7430978866d4dd88404b2d")
    );
    let img = image::open(&path).unwrap();
    assert_eq!((img.width(), img.height()), (256, 256));

    // Refresh finds the file
    assert_eq!(host.refresh(&state), Some(state.clone()));

    // Update regenerates at the new size
    let updated = host.apply(Some(&state), json!({"text": "qrcode", "file": file, "size": 512}));
    assert_ne!(updated["sha256"], state["sha256"]);
    assert_eq!(updated["sha256"], json!(file_sha256(&path)));
    assert_eq!(image::open(&path).unwrap().width(), 512);

    // Drift: the file disappears and the resource drops out of state
    fs::remove_file(&path).unwrap();
    assert_eq!(host.refresh(&updated), None);

    // Recreate, then destroy
    let state = host.apply(None, json!({"text": "qrcode", "file": file, "size": 512}));
    assert_eq!(state["sha256"], updated["sha256"]);
    let destroyed = host.service.apply_change(TYPE_NAME, Some(&state), None).unwrap();
    assert_eq!(destroyed, None);
    assert!(!path.exists());
}

#[test]
fn changing_file_path_leaves_old_file() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.png");
    let second = dir.path().join("second.png");
    let host = Host::new();

    let state = host.apply(None, json!({"text": "qrcode", "file": first.to_str().unwrap()}));
    let moved = host.apply(Some(&state), json!({"text": "qrcode", "file": second.to_str().unwrap()}));

    assert!(first.exists());
    assert!(second.exists());
    assert_eq!(moved["sha256"], state["sha256"]);
}

#[test]
fn resource_rejects_bad_size_at_plan() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("qr.png");
    let host = Host::new();
    let config = object(json!({"text": "qrcode", "file": path.to_str().unwrap(), "size": 50}));

    let mut diags = Diagnostics::default();
    let planned = host
        .service
        .plan_change(TYPE_NAME, None, Some(&config), &config, &BTreeSet::new(), &mut diags)
        .unwrap();
    assert!(planned.state.is_none());
    let diag = diags.iter().next().unwrap();
    assert_eq!(diag.detail, "Size must be between 100 and 2000 pixels.");
    assert_eq!(diag.attribute.as_deref(), Some("size"));
    assert!(!path.exists());
}

#[test]
fn sensitive_text_resource_matches_plain_text() {
    let dir = TempDir::new().unwrap();
    let plain = dir.path().join("plain.png");
    let hidden = dir.path().join("hidden.png");
    let host = Host::new();

    let a = host.apply(None, json!({"text": "secret", "file": plain.to_str().unwrap()}));
    let b = host.apply(None, json!({"sensitive_text": "secret", "file": hidden.to_str().unwrap()}));
    assert_eq!(a["sha256"], b["sha256"]);
}
