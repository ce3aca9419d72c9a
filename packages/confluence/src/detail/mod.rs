// internal machinery of the crate. nothing here is part of the supported API
// surface; it is public only so the capability traits and op types can name
// it in their hidden plumbing.
//
// the layering:
//
//      slot <------ state: owns the mutex and implements the hand-off rules
//                   ^      for every buffer/waiter configuration. everything
//      buffer <-----|      unsafe about waiter nodes bottoms out here and in
//                   |      waiter.
//      waiter <-----/

pub mod buffer;
pub mod slot;
pub mod state;
pub mod waiter;
