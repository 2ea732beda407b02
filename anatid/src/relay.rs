use crate::fetcher::Fetcher;
use crate::poller::PollTrigger;
use crate::tribune::Tribunes;
use crate::types::{AuthType, BearerToken, Result, Tribune};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Form a viewer submits to post on a tribune.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub tribune: String,
    #[serde(default)]
    pub message: String,
    /// JSON `{"access_token": ".."}` for bearer-forwarding tribunes.
    #[serde(default)]
    pub auth: Option<String>,
}

/// Forwards viewer posts to their tribune, then asks for that tribune to be re-polled.
#[derive(Clone)]
pub struct Relay {
    tribunes: Arc<Tribunes>,
    fetcher: Fetcher,
    trigger: PollTrigger,
}

impl Relay {
    pub fn new(tribunes: Arc<Tribunes>, fetcher: Fetcher, trigger: PollTrigger) -> Self {
        Self {
            tribunes,
            fetcher,
            trigger,
        }
    }

    /// Relay one submission. Returns `false` when the tribune is not configured, in which case
    /// nothing is sent and no poll is requested. Backend failures are only logged.
    pub async fn relay(&self, form: PostForm, user_agent: Option<String>) -> bool {
        let Some(tribune) = self.tribunes.get(&form.tribune) else {
            debug!("Ignoring post for unknown tribune {:?}", form.tribune);
            return false;
        };

        match self.submit(tribune, &form, user_agent.as_deref()).await {
            Ok(()) => info!("Posted to {}", tribune.name),
            Err(e) => warn!("Post to {} failed: {}", tribune.name, e),
        }

        self.trigger.request(&tribune.name);
        true
    }

    async fn submit(&self, tribune: &Tribune, form: &PostForm, user_agent: Option<&str>) -> Result<()> {
        let fields = build_form(tribune, form);
        self.fetcher
            .submit_form(&tribune.post_url, &fields, user_agent)
            .await?;
        Ok(())
    }
}

/// Backend form fields for a submission: the message under the tribune's field name, plus
/// `bearer_token` when the tribune wants one and the viewer sent a readable credential.
pub fn build_form(tribune: &Tribune, form: &PostForm) -> Vec<(String, String)> {
    let mut fields = vec![(tribune.post_field.clone(), form.message.clone())];

    if tribune.auth_type == AuthType::Bearer {
        let auth = form.auth.as_deref().unwrap_or_default();
        match serde_json::from_str::<BearerToken>(auth) {
            Ok(token) => fields.push(("bearer_token".to_string(), token.access_token)),
            Err(e) => warn!("Unreadable credential for {}, posting without it: {}", tribune.name, e),
        }
    }

    fields
}
