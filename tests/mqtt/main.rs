mod mock;
mod session;
