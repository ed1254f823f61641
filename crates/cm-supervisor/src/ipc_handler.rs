//! Maps one decoded [`cm_ipc::Request`] onto [`Supervisor`] calls and builds
//! the matching [`cm_ipc::Response`] (§4.8).

use crate::supervisor::Supervisor;
use cm_ipc::{Request, Response};
use cm_runtime::ContainerRuntime;

pub fn handle<R: ContainerRuntime>(supervisor: &mut Supervisor<R>, request: Request) -> Response {
    match request {
        Request::GetGuests => Response::Guests(supervisor.guest_list()),
        Request::LifecycleByName { subcommand, target } => {
            Response::Lifecycle(supervisor.request_lifecycle_by_name(&target, subcommand))
        }
        Request::LifecycleByRole { subcommand, target } => {
            Response::Lifecycle(supervisor.request_lifecycle_by_role(&target, subcommand))
        }
        Request::ChangeActiveByName { target } => {
            Response::Change(supervisor.change_active_by_name(&target))
        }
    }
}
