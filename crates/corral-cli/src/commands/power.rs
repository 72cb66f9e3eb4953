use super::{json_pretty, load_container, EXIT_SUCCESS};
use corral_core::Engine;

#[derive(Debug, Clone, Copy)]
pub enum Action {
    Stop,
    Boot,
    Reboot,
}

impl Action {
    fn past_tense(self) -> &'static str {
        match self {
            Self::Stop => "stopped",
            Self::Boot => "started",
            Self::Reboot => "restarted",
        }
    }
}

pub fn run(engine: &Engine, name: &str, action: Action, json: bool) -> Result<u8, String> {
    let mut container = load_container(engine, name)?;
    let result = match action {
        Action::Stop => engine.stop(&mut container),
        Action::Boot => engine.boot(&mut container),
        Action::Reboot => engine.reboot(&mut container),
    };
    result.map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&container)?);
    } else {
        println!("{} container {name}", action.past_tense());
    }
    Ok(EXIT_SUCCESS)
}
