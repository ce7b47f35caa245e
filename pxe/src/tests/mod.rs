mod mocks;
mod service;
