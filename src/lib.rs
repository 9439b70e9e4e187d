/*!
A Minecraft 1.8.9 intercepting proxy core: session encryption/login,
dispatch, a clientbound/serverbound game-state mirror, and a broadcast
pipeline that lets side-channel spectator peers watch an owner's session
live.

# Examples
```no_run
use vitrum::proxy;

fn main() -> vitrum::TetsuResult<()> {
    proxy::run()
}
```
*/

#![allow(dead_code)]

#[macro_use]
mod macros;

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod dispatch;
pub mod errors;
pub mod event;
pub mod eventbus;
pub mod gamestate;
pub mod login;
pub mod mojang;
pub mod msauth;
pub mod proxy;
pub mod serialization;
pub mod session;
pub mod stream;
mod versions;

pub use errors::TetsuResult;

#[cfg(test)]
mod tests;
