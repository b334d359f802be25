#[actix_web::main]
async fn main() -> std::process::ExitCode {
    match sql_certifier_lib::run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sql-certifier: {}", e);
            std::process::ExitCode::FAILURE
        }
    }
}
