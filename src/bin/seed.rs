/*!
Populating the local "fake production" environment with sufficient data
to allow some experimentation.

Fake production data can be found in `crate_root/fakeprod_data`. The
inserts skip emails already present, so running this repeatedly is
harmless.
*/
use simplelog::{ColorChoice, TerminalMode, TermLogger};

use registrar::config;
use registrar::user::{Student, Teacher};

static DEFAULT_CONFIG: &str = "config.toml";
static TEACHERS_CSV: &str = "fakeprod_data/teachers.csv";
static STUDENTS_CSV: &str = "fakeprod_data/students.csv";

fn read_teachers() -> Vec<Teacher> {
    let file = std::fs::File::open(TEACHERS_CSV).unwrap();
    Teacher::vec_from_csv_reader(file).unwrap()
}

fn read_students() -> Vec<Student> {
    let file = std::fs::File::open(STUDENTS_CSV).unwrap();
    Student::vec_from_csv_reader(file).unwrap()
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("registrar")
        .build();
    TermLogger::init(
        registrar::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();

    let config_path = std::env::args().nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_owned());
    let glob = config::load_configuration(&config_path).await.unwrap();

    let teachers = read_teachers();
    let n = glob.store.insert_teachers(&teachers).await.unwrap();
    println!("Inserted {} of {} teachers.", n, teachers.len());

    let students = read_students();
    let n = glob.store.insert_students(&students).await.unwrap();
    println!("Inserted {} of {} students.", n, students.len());
}
