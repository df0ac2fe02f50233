use parking_lot::Mutex;

use crate::action::Action;
use crate::config::ClientConfig;
use crate::editing::{Article, DeleteOutcome, EditOutcome, post_delete, post_modify_content};
use crate::error::ActionError;
use crate::executor::{ErrorPolicy, Executor, Rethrow, Transport};
use crate::meta::{GetUserinfo, GetVersion, LoginData, PostLogin, Userinfo};
use crate::transport::HttpTransport;
use crate::version::Version;

struct ClientState {
    executor: Executor,
    version: Option<Version>,
    pinned_version: bool,
    userinfo: Option<Userinfo>,
    login: Option<LoginData>,
    login_changed_userinfo: bool,
    login_changed_version: bool,
}

pub struct WikiClient {
    state: Mutex<ClientState>,
}

impl WikiClient {
    pub fn new(transport: impl Transport + Send + 'static) -> Self {
        Self::with_policy(transport, Rethrow)
    }

    pub fn with_policy(
        transport: impl Transport + Send + 'static,
        policy: impl ErrorPolicy + Send + Sync + 'static,
    ) -> Self {
        Self::from_executor(Executor::with_policy(transport, policy), None)
    }

    pub fn with_version(transport: impl Transport + Send + 'static, version: Version) -> Self {
        Self::from_executor(Executor::new(transport), Some(version))
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ActionError> {
        let transport = HttpTransport::new(config.clone())?;
        Ok(Self::from_executor(Executor::new(transport), config.version))
    }

    fn from_executor(executor: Executor, version: Option<Version>) -> Self {
        Self {
            state: Mutex::new(ClientState {
                executor,
                version,
                pinned_version: version.is_some(),
                userinfo: None,
                login: None,
                login_changed_userinfo: false,
                login_changed_version: false,
            }),
        }
    }

    pub fn perform<A: Action + ?Sized>(&self, action: &mut A) -> Result<(), ActionError> {
        self.state.lock().executor.perform(action)
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().executor.request_count()
    }

    pub fn version(&self) -> Result<Version, ActionError> {
        let mut state = self.state.lock();
        if let Some(version) = state.version {
            if !state.login_changed_version || state.pinned_version {
                return Ok(version);
            }
        }
        let mut action = GetVersion::new();
        state.executor.perform(&mut action)?;
        let version = action.version();
        tracing::debug!(%version, generator = action.generator().unwrap_or(""), "negotiated version");
        state.version = Some(version);
        state.login_changed_version = false;
        Ok(version)
    }

    pub fn userinfo(&self) -> Result<Userinfo, ActionError> {
        let version = self.version()?;
        let mut state = self.state.lock();
        if let Some(userinfo) = &state.userinfo {
            if !state.login_changed_userinfo {
                return Ok(userinfo.clone());
            }
        }
        let mut action = GetUserinfo::new(version)?;
        state.executor.perform(&mut action)?;
        let userinfo = action
            .into_userinfo()
            .ok_or_else(|| ActionError::parse("userinfo", "no userinfo in response"))?;
        state.userinfo = Some(userinfo.clone());
        state.login_changed_userinfo = false;
        Ok(userinfo)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<LoginData, ActionError> {
        self.login_with_domain(username, password, None)
    }

    pub fn login_with_domain(
        &self,
        username: &str,
        password: &str,
        domain: Option<&str>,
    ) -> Result<LoginData, ActionError> {
        let version = self.version()?;
        let mut action = PostLogin::new(version, username, password, domain)?;
        let mut state = self.state.lock();
        state.executor.perform(&mut action)?;
        let data = action
            .login_data()
            .cloned()
            .ok_or_else(|| ActionError::parse("login", "no login result"))?;
        state.login = Some(data.clone());
        state.login_changed_userinfo = true;
        if state.version == Some(Version::Unknown) {
            state.login_changed_version = true;
        }
        Ok(data)
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.lock().login.is_some()
    }

    pub fn delete(&self, title: &str, reason: Option<&str>) -> Result<DeleteOutcome, ActionError> {
        let version = self.version()?;
        let userinfo = self.userinfo()?;
        let mut action = post_delete(version, &userinfo, title, reason)?;
        self.perform(&mut action)?;
        action
            .operation()
            .outcome()
            .cloned()
            .ok_or_else(|| ActionError::parse("delete", "no delete result"))
    }

    pub fn write_content(&self, article: &Article) -> Result<EditOutcome, ActionError> {
        if !self.is_logged_in() {
            return Err(ActionError::precondition("please login first"));
        }
        let version = self.version()?;
        let mut action = post_modify_content(version, article)?;
        self.perform(&mut action)?;
        action
            .operation()
            .outcome()
            .cloned()
            .ok_or_else(|| ActionError::parse("edit", "no edit result"))
    }
}
