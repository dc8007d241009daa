//! Builders for test configs, table rows and document bodies.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use approval_sync::browser::Element;
use approval_sync::config::{
    Config, CredentialsConfig, DownloadConfig, OutputConfig, SelectorConfig, SiteConfig,
    StatusKeywords,
};

pub const LIST_PATH: &str = "/approvals";
pub const OTP_SELECTOR: &str = "input[name='otp']";
pub const LANDMARK_SELECTOR: &str = ".user-profile";

/// Builder for creating `Config` instances pointed at a test server.
pub struct ConfigBuilder {
    base_url: String,
    output_root: PathBuf,
    credentials: CredentialsConfig,
    download: DownloadConfig,
    template_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Defaults tuned for tests: no delays, short waits, a direct password.
    pub fn new(base_url: &str, output_root: &Path) -> Self {
        Self {
            base_url: base_url.to_string(),
            output_root: output_root.to_path_buf(),
            credentials: CredentialsConfig {
                username: "alice".to_string(),
                company_code: "ACME".to_string(),
                password_insecure: Some("hunter2".to_string()),
                ..CredentialsConfig::default()
            },
            download: DownloadConfig {
                success_delay_ms: 0,
                failure_delay_ms: 0,
                two_factor_timeout_secs: 1,
                manual_login_wait_secs: 0,
                request_timeout_secs: 30,
                connect_timeout_secs: 5,
                ..DownloadConfig::default()
            },
            template_path: None,
        }
    }

    pub fn totp_secret(mut self, secret: &str) -> Self {
        self.credentials.totp_secret_insecure = Some(secret.to_string());
        self
    }

    pub fn manual_login(mut self, wait_secs: u64) -> Self {
        self.credentials.manual_login = true;
        self.credentials.password_insecure = None;
        self.download.manual_login_wait_secs = wait_secs;
        self
    }

    pub fn manual_login_wait(mut self, secs: u64) -> Self {
        self.download.manual_login_wait_secs = secs;
        self
    }

    pub fn concurrency(mut self, limit: usize) -> Self {
        self.download.concurrency = limit;
        self
    }

    pub fn template_path(mut self, path: &Path) -> Self {
        self.template_path = Some(path.to_path_buf());
        self
    }

    pub fn build(self) -> Config {
        Config {
            version: "1.0".to_string(),
            site: SiteConfig {
                base_url: self.base_url,
                login_path: "/login".to_string(),
                list_path: LIST_PATH.to_string(),
                download_link_marker: "download".to_string(),
            },
            selectors: SelectorConfig::default(),
            credentials: self.credentials,
            download: self.download,
            status: StatusKeywords::default(),
            output: OutputConfig {
                root: self.output_root,
                registry_file: None,
                template_path: self.template_path,
            },
        }
    }
}

/// A table row in the portal's fixed layout: period in the 3rd cell, amount
/// in the 5th, creator in the 7th, links in the 8th.
pub fn row(status: &str, creator: &str, period: &str, href: &str) -> Element {
    Element::new("tr")
        .with_child(Element::new("td").with_text("1"))
        .with_child(Element::new("td").with_text(status))
        .with_child(Element::new("td").with_text(period))
        .with_child(Element::new("td").with_text("Timesheet"))
        .with_child(Element::new("td").with_text("1.250.000"))
        .with_child(Element::new("td").with_text(""))
        .with_child(Element::new("td").with_text(creator))
        .with_child(
            Element::new("td")
                .with_child(Element::new("a").with_attr("href", href).with_text("Download"))
                .with_child(Element::new("a").with_attr("href", href).with_text("Again")),
        )
}

pub fn header_row() -> Element {
    Element::new("tr")
        .with_child(Element::new("th").with_text("Status"))
        .with_child(Element::new("th").with_text("Creator"))
}

/// A minimal one-sheet `.xlsx`. Numeric-looking cells become numeric cells.
pub fn workbook(rows: &[&[&str]]) -> Vec<u8> {
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for row in rows {
        sheet.push_str("<row>");
        for value in row.iter() {
            if value.parse::<f64>().is_ok() {
                sheet.push_str(&format!("<c><v>{}</v></c>", value));
            } else {
                sheet.push_str(&format!(r#"<c t="inlineStr"><is><t>{}</t></is></c>"#, value));
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    zip_of(&[
        ("[Content_Types].xml", br#"<?xml version="1.0"?><Types/>"#.as_slice()),
        ("xl/worksheets/sheet1.xml", sheet.as_bytes()),
    ])
}

/// Workbook with a single total row.
pub fn workbook_with_total(label: &str, total: &str) -> Vec<u8> {
    workbook(&[&["Employee", "Amount"], &[label, ""], &["Total", total]])
}

pub fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in files {
            zip.start_file(*name, options).expect("start zip entry");
            zip.write_all(content).expect("write zip entry");
        }
        zip.finish().expect("finish zip");
    }
    buf.into_inner()
}

/// Every file under `root`, relative, sorted.
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}
