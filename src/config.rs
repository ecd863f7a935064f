/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::{
    auth,
    notify::{LogMailer, Mailer, SmtpMailer},
    store::Store,
};

#[derive(Deserialize)]
struct ConfigFile {
    db_connect_string: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    base_url: Option<String>,
    templates_dir: Option<String>,
    restrict_create_paths_to_students: Option<bool>,
    smtp_host: Option<String>,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    mail_from: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SmtpCfg {
    pub host: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct Cfg {
    pub db_connect_string: String,
    pub addr: SocketAddr,
    /// Absolute URL prefix mailed out in password-reset links.
    pub base_url: String,
    pub templates_dir: String,
    /// When set, only students may reach the three request-creation paths.
    pub restrict_create_paths_to_students: bool,
    /// Without SMTP settings, mail goes to the log instead of the wire.
    pub smtp: Option<SmtpCfg>,
    pub mail_from: String,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            db_connect_string: "host=localhost user=quad_test password='quad_test' dbname=quad_test".to_owned(),
            addr: SocketAddr::new(
                "0.0.0.0".parse().unwrap(),
                8001
            ),
            base_url: "http://localhost:8001".to_owned(),
            templates_dir: "templates/".to_owned(),
            restrict_create_paths_to_students: true,
            smtp: None,
            mail_from: "Quad Portal <no-reply@quad.not.an.address>".to_owned(),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.db_connect_string {
            c.db_connect_string = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(s) = cf.base_url {
            c.base_url = s;
        }
        if let Some(s) = cf.templates_dir {
            c.templates_dir = s;
        }
        if let Some(b) = cf.restrict_create_paths_to_students {
            c.restrict_create_paths_to_students = b;
        }
        if let Some(s) = cf.mail_from {
            c.mail_from = s;
        }

        // SMTP only makes sense as a complete set.
        match (cf.smtp_host, cf.smtp_username, cf.smtp_password) {
            (Some(host), Some(username), Some(password)) => {
                c.smtp = Some(SmtpCfg { host, username, password });
            },
            (None, None, None) => {},
            _ => {
                return Err(
                    "smtp_host, smtp_username, and smtp_password must be \
                     configured together (or not at all).".to_owned()
                );
            },
        }

        Ok(c)
    }
}

/**
This guy hauls around the shared state and gets passed in an
`axum::Extension` to the handlers and middleware that need him.

Everything a handler collaborates with comes through here; there are no
ambient singletons.
*/
pub struct Glob {
    pub addr: SocketAddr,
    pub base_url: String,
    pub restrict_create_paths_to_students: bool,
    store: Store,
    auth: auth::Db,
    mail: Box<dyn Mailer>,
}

impl Glob {
    pub fn store(&self) -> &Store { &self.store }
    pub fn auth(&self) -> &auth::Db { &self.auth }
    pub fn mail(&self) -> &dyn Mailer { self.mail.as_ref() }
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
pub async fn load_configuration(cfg: Cfg) -> Result<Glob, String> {
    log::info!("Configuration:\n{:#?}", &cfg);

    log::trace!("Checking state of data DB...");
    let store = Store::new(cfg.db_connect_string.clone());
    if let Err(e) = store.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", e.display());
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    log::trace!("Checking state of auth DB...");
    let auth_db = auth::Db::new(cfg.db_connect_string.clone());
    if let Err(e) = auth_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of auth DB: {}", e.display());
        return Err(estr);
    }
    log::trace!("...auth DB okay.");

    let mail: Box<dyn Mailer> = match &cfg.smtp {
        Some(smtp) => {
            log::info!("Sending mail through {}.", &smtp.host);
            Box::new(SmtpMailer::new(
                &smtp.host,
                smtp.username.clone(),
                smtp.password.clone(),
                &cfg.mail_from,
            )?)
        },
        None => {
            log::info!("No SMTP configuration; mail goes to the log.");
            Box::new(LogMailer)
        },
    };

    let glob = Glob {
        addr: cfg.addr,
        base_url: cfg.base_url,
        restrict_create_paths_to_students: cfg.restrict_create_paths_to_students,
        store,
        auth: auth_db,
        mail,
    };

    Ok(glob)
}
