#[cfg(test)]
mod common;


#[cfg(test)]
mod access_control_tests;


#[cfg(test)]
mod forward_auth_tests;

#[cfg(test)]
mod config_js_tests;

#[cfg(test)]
mod redirect_tests;

#[cfg(test)]
mod login_flow_tests;
