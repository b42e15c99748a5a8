use std::fmt;

use serde::Serialize;

use crate::error::AppResult;
use crate::infrastructure::GpoContext;

/// Everything an action needs for one invocation.
pub struct ActionContext<'a> {
    pub gpo: GpoContext<'a>,
    /// Account the invocation runs as; new OUs grant it full control.
    pub acting_user: Option<String>,
}

pub trait Action {
    type Output: fmt::Debug + fmt::Display + Serialize;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output>;
}

/// Builds the `Command` subcommand enum, the matching `Report` enum and the
/// dispatch between them.
#[macro_export]
macro_rules! action_enum {
    ($($(#[$meta:meta])* ($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(clap::Subcommand, Debug, Clone)]
        pub enum Command {
            $($(#[$meta])* $variant($type),)*
        }

        #[derive(Debug, serde::Serialize)]
        #[serde(untagged)]
        pub enum Report {
            $($variant(<$type as $crate::commands::Action>::Output),)*
        }

        impl $crate::commands::Action for Command {
            type Output = Report;

            fn execute(
                &self,
                ctx: &$crate::commands::ActionContext,
            ) -> $crate::error::AppResult<Self::Output> {
                match self {
                    $(
                        Command::$variant(action) => action.execute(ctx).map(Report::$variant),
                    )*
                }
            }
        }

        impl std::fmt::Display for Report {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        Report::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}

/// One `WARNING:` line per permission left off the SYSVOL ACL.
pub(crate) fn write_unmapped(
    f: &mut fmt::Formatter<'_>,
    unmapped: &[crate::domain::UnmappedPermission],
) -> fmt::Result {
    for warning in unmapped {
        write!(f, "\nWARNING: {}", warning)?;
    }
    Ok(())
}
