//! URL endpoint constants for the Google Drive and OAuth2 services.

#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    pub files: &'static str,
    pub upload: &'static str,
    pub discovery: &'static str,
    pub authorize: &'static str,
    pub token: &'static str,
}

impl Endpoints {
    pub const fn google() -> Self {
        Self {
            files: "https://www.googleapis.com/drive/v3/files",
            upload: "https://www.googleapis.com/upload/drive/v3/files",
            discovery: "https://www.googleapis.com/discovery/v1/apis/drive/v3/rest",
            authorize: "https://accounts.google.com/o/oauth2/v2/auth",
            token: "https://oauth2.googleapis.com/token",
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::google()
    }
}
