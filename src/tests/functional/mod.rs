// Licensed under the Apache-2.0 license

mod dma_i3c_test;
mod i3c_bus_test;
