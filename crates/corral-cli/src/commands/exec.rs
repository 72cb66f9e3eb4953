use super::{load_container, password_auth, EXIT_FAILURE, EXIT_SUCCESS};
use corral_core::Engine;
use corral_exec::ExecError;
use std::io::Write;

pub fn run(
    engine: &Engine,
    name: &str,
    user: &str,
    port: u16,
    login_user: Option<&str>,
    instruction: &str,
) -> Result<u8, String> {
    let container = load_container(engine, name)?.with_auth(password_auth(user, port)?);
    let mut session = engine.open_session(&container).map_err(|e| e.to_string())?;

    let result = session.exec(instruction, login_user);
    let closed = session.close();
    match result {
        Ok(output) => {
            std::io::stdout()
                .write_all(&output)
                .map_err(|e| format!("failed to write output: {e}"))?;
            closed.map_err(|e| e.to_string())?;
            Ok(EXIT_SUCCESS)
        }
        Err(ExecError::NonZeroExit {
            code, stdout, stderr, ..
        }) => {
            std::io::stdout()
                .write_all(&stdout)
                .map_err(|e| format!("failed to write output: {e}"))?;
            eprintln!("{stderr}");
            Ok(u8::try_from(code).unwrap_or(EXIT_FAILURE))
        }
        Err(e) => Err(format!("exec error: {e}")),
    }
}
