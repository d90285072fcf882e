//! Request submission: SID stamping, handler creation, sync/async glue.

use std::sync::Arc;

use xrd_proto::Message;

use crate::handler::{OneshotHandler, RequestOutcome, ResponseHandler};
use crate::msghandler::{SendParams, XRootDMsgHandler};
use crate::postmaster::PostMaster;
use crate::status::XrdResult;
use crate::url::Url;

/// Stamp a fresh SID on `msg`, wrap it in a per-request state machine and
/// send it towards `url`, delivering the terminal outcome to `handler`.
pub fn send_request(
    post: &Arc<PostMaster>,
    url: &Url,
    mut msg: Message,
    handler: Arc<dyn ResponseHandler>,
    params: &SendParams,
) -> XrdResult<()> {
    let info = post.query_transport(url)?;
    let sid_mgr = info.sid_manager().clone();
    let sid = sid_mgr.allocate()?;
    msg.set_req_sid(sid);

    tracing::trace!(target: "xrd::xmsg", host = %url.host_id(), msg = %msg.description(),
        sid, "sending message");

    let msg_handler = XRootDMsgHandler::new(
        post.clone(),
        msg,
        url.clone(),
        sid_mgr.clone(),
        handler,
        params,
    );
    msg_handler.send().map_err(|err| {
        sid_mgr.release(sid);
        err
    })
}

/// Like [`send_request`], but await the terminal outcome.
pub async fn send_request_async(
    post: &Arc<PostMaster>,
    url: &Url,
    msg: Message,
    params: &SendParams,
) -> XrdResult<RequestOutcome> {
    let (handler, rx) = OneshotHandler::new();
    send_request(post, url, msg, handler, params)?;
    Ok(crate::handler::wait_outcome(rx).await)
}
