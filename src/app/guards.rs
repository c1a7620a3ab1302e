use actix_web::guard::{Guard, GuardContext};
use log::warn;
use crate::utils::ip_utils::parse_ip;

// A guard will just cause the router to not match the
// route and thus probably show a 404. What I'd need
// would be a middleware and not a guard. But it does
// the trick anyway.
// Only looks at the connection address, proxy headers are
// trivial to forge.
pub struct IPRestrictedGuard<T: 'static + AsRef<str>> {
  allowed_ip_addresses: &'static [T]
}

impl<T: AsRef<str>> IPRestrictedGuard<T> {
  pub fn new(allowed_ips: &'static [T]) -> Self {
    Self {
      allowed_ip_addresses: allowed_ips
    }
  }
}

impl<T: AsRef<str>> Guard for IPRestrictedGuard<T> {
  fn check(&self, ctx: &GuardContext<'_>) -> bool {
    let head = ctx.head();
    match head.peer_addr {
      Some(sock_addr) => {
        let addr = sock_addr.ip();
        // Comparing parsed addresses so "::1" and
        // "0:0:0:0:0:0:0:1" are the same thing.
        if self.allowed_ip_addresses.iter()
          .filter_map(|i| parse_ip(i.as_ref()))
          .any(|i| i == addr) {
          true
        } else {
          warn!("IP address {} attempted to reach protected \
            endpoint at {}", addr, head.uri);
          false
        }
      },
      None => false
    }
  }
}
