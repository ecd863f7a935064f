/*!
Populating a local "fake production" database with sufficient data to
allow some experimentation: one faculty member per department and one
demo student, all with the password "password".

Don't point this at anything real.
*/
use simplelog::{ColorChoice, TerminalMode, TermLogger};

use quad::auth::hash_password;
use quad::config::Cfg;
use quad::store::Store;
use quad::user::{BaseUser, Department, Faculty, Student};

const SEED_PASSWORD: &str = "password";

fn faculty_for(department: Department) -> Faculty {
    let slug = department.to_string().to_lowercase();
    Faculty {
        base: BaseUser {
            email: format!("{}@university.edu", &slug),
            first_name: "Faculty".to_owned(),
            last_name: department.label().to_owned(),
            phone: "9195550100".to_owned(),
        },
        department,
    }
}

#[tokio::main]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("quad")
        .build();
    TermLogger::init(
        quad::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();

    let config_path = std::env::var("QUAD_CONFIG")
        .unwrap_or_else(|_| "quad.toml".to_owned());
    let cfg = if std::path::Path::new(&config_path).exists() {
        Cfg::from_file(&config_path).unwrap()
    } else {
        Cfg::default()
    };

    let store = Store::new(cfg.db_connect_string);
    store.ensure_db_schema().await.unwrap();

    let hash = hash_password(SEED_PASSWORD).unwrap();

    for department in Department::ALL.iter() {
        let f = faculty_for(*department);
        match store.get_user_by_email(&f.base.email).await.unwrap() {
            Some(_) => {
                log::info!("{} already present; skipping.", &f.base.email);
            },
            None => {
                store.insert_faculty(&f, &hash).await.unwrap();
                log::info!("Inserted faculty {} for {}.", &f.base.email, department);
            },
        }
    }

    let student = Student {
        base: BaseUser {
            email: "student@university.edu".to_owned(),
            first_name: "John".to_owned(),
            last_name: "Doe".to_owned(),
            phone: "8888888888".to_owned(),
        },
        student_id: "1333567".to_owned(),
    };
    match store.get_user_by_email(&student.base.email).await.unwrap() {
        Some(_) => {
            log::info!("{} already present; skipping.", &student.base.email);
        },
        None => {
            store.insert_student(&student, &hash).await.unwrap();
            log::info!("Inserted student {}.", &student.base.email);
        },
    }

    println!(
        "Seeded {} faculty departments and student@university.edu \
         (password: {:?}).",
        Department::ALL.len(), SEED_PASSWORD
    );
}
