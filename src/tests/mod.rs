// Licensed under the Apache-2.0 license

mod functional;
pub mod mock;
