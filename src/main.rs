// src/main.rs
mod access;
mod annotation;
mod components;
mod config;
mod editor;
mod error;
mod geometry;
mod history;
mod media;
mod offline;
mod render;
mod scene;
mod utils;
mod viewer;

use access::TopoAction;
use annotation::ABSENT_FIELD;
use components::topo_editor::TopoEditor;
use components::topo_viewer::TopoViewer;
use config::{load_config, TopoConfig};
use error::TopoError;
use gloo::file::ObjectUrl;
use gloo_net::http::Request;
use offline::{hydrate, load_snapshot, save_snapshot, LocalSnapshotStore, OfflineSnapshot, OfflineStatus};
use serde::Deserialize;
use utils::resource_url;
use web_sys::File;
use yew::prelude::*;

/// One route as listed in `public/routes.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RouteRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub topo_url: Option<String>,
    /// Stored document, kept raw so a corrupt one still reaches the viewer.
    #[serde(default)]
    pub topo_data: Option<serde_json::Value>,
}

impl RouteRecord {
    fn field_value(&self) -> String {
        match &self.topo_data {
            Some(serde_json::Value::Null) | None => ABSENT_FIELD.to_string(),
            Some(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Visitor,
    Setter,
}

impl Role {
    fn allows(self, action: TopoAction) -> bool {
        match (self, action) {
            (_, TopoAction::View) => true,
            (Role::Setter, TopoAction::Edit) => true,
            (Role::Visitor, TopoAction::Edit) => false,
        }
    }

    fn parse(value: &str) -> Role {
        match value {
            "setter" => Role::Setter,
            _ => Role::Visitor,
        }
    }
}

pub enum AppMsg {
    ConfigLoaded(TopoConfig),
    RoutesLoaded(Vec<RouteRecord>),
    RoutesFailed(String),
    SelectRoute(String),
    SetRole(Role),
    DocumentChanged(String),
    ImageIngested(File),
    SaveOffline,
    OfflineSaved(Result<OfflineSnapshot, TopoError>),
    LoadOffline,
}

pub struct App {
    config: Option<TopoConfig>,
    routes: Vec<RouteRecord>,
    current_route: String,
    role: Role,
    /// The hidden form field: what a form submit would send.
    field_value: String,
    image_url: Option<String>,
    generation: u64,
    offline_status: Option<OfflineStatus>,
    saving: bool,
    /// Keeps blob URLs alive while the editor and viewer show them.
    local_image: Option<ObjectUrl>,
    loading: bool,
}

impl App {
    fn route(&self) -> Option<&RouteRecord> {
        self.routes.iter().find(|r| r.id == self.current_route)
    }

    fn open_route(&mut self, id: String) {
        self.current_route = id;
        let (url, field) = match self.route() {
            Some(route) => (route.topo_url.clone(), route.field_value()),
            None => (None, ABSENT_FIELD.to_string()),
        };
        self.image_url = url;
        self.field_value = field;
        self.local_image = None;
        self.offline_status = None;
        self.generation += 1;
    }

    fn offline_prefix(&self) -> String {
        self.config
            .as_ref()
            .map(|c| c.offline_key_prefix.clone())
            .unwrap_or_else(|| TopoConfig::default().offline_key_prefix)
    }
}

impl Component for App {
    type Message = AppMsg;
    type Properties = ();

    fn create(ctx: &Context<Self>) -> Self {
        ctx.link()
            .send_future(async { AppMsg::ConfigLoaded(load_config().await) });
        ctx.link().send_future(async {
            match load_routes().await {
                Ok(routes) => AppMsg::RoutesLoaded(routes),
                Err(e) => AppMsg::RoutesFailed(e),
            }
        });

        Self {
            config: None,
            routes: Vec::new(),
            current_route: String::new(),
            role: Role::Setter,
            field_value: ABSENT_FIELD.to_string(),
            image_url: None,
            generation: 0,
            offline_status: None,
            saving: false,
            local_image: None,
            loading: true,
        }
    }

    fn update(&mut self, ctx: &Context<Self>, msg: Self::Message) -> bool {
        match msg {
            AppMsg::ConfigLoaded(config) => {
                self.config = Some(config);
                true
            }
            AppMsg::RoutesLoaded(routes) => {
                self.routes = routes;
                self.loading = false;
                if let Some(first) = self.routes.first() {
                    let id = first.id.clone();
                    self.open_route(id);
                }
                true
            }
            AppMsg::RoutesFailed(error) => {
                log::error!("Failed to load routes: {}", error);
                self.loading = false;
                true
            }
            AppMsg::SelectRoute(id) => {
                self.open_route(id);
                true
            }
            AppMsg::SetRole(role) => {
                self.role = role;
                self.generation += 1;
                true
            }
            AppMsg::DocumentChanged(value) => {
                self.field_value = value;
                true
            }
            AppMsg::ImageIngested(file) => {
                log::info!("Storing uploaded topo photo {}", file.name());
                let url = media::object_url_for(file);
                self.image_url = Some(url.to_string());
                self.local_image = Some(url);
                true
            }
            AppMsg::SaveOffline => {
                if self.saving {
                    return false;
                }
                self.saving = true;
                let route_id = self.current_route.clone();
                let topo_url = self.image_url.clone();
                let field = self.field_value.clone();
                let prefix = self.offline_prefix();
                ctx.link().send_future(async move {
                    let mut store = LocalSnapshotStore::new(prefix);
                    AppMsg::OfflineSaved(save_snapshot(&mut store, &route_id, topo_url, &field).await)
                });
                true
            }
            AppMsg::OfflineSaved(result) => {
                self.saving = false;
                self.offline_status = Some(match result {
                    Ok(_) => OfflineStatus::Saved,
                    Err(e) => OfflineStatus::Failed(e.to_string()),
                });
                true
            }
            AppMsg::LoadOffline => {
                let store = LocalSnapshotStore::new(self.offline_prefix());
                match load_snapshot(&store, &self.current_route) {
                    Some(snapshot) => {
                        let hydrated = hydrate(&snapshot);
                        self.image_url = hydrated.image_url;
                        self.field_value = hydrated.field_value;
                        self.local_image = hydrated.object_url;
                        self.generation += 1;
                        self.offline_status = Some(OfflineStatus::Loaded);
                    }
                    None => self.offline_status = Some(OfflineStatus::Missing),
                }
                true
            }
        }
    }

    fn view(&self, ctx: &Context<Self>) -> Html {
        let header = html! {
            <header class="app-header">
                <h1>{"Route topos"}</h1>
            </header>
        };
        let Some(config) = self.config.clone().filter(|_| !self.loading) else {
            return html! {
                <div class="app-container">
                    { header }
                    <main class="app-main"><div class="loading">{"Loading…"}</div></main>
                </div>
            };
        };
        if self.routes.is_empty() {
            return html! {
                <div class="app-container">
                    { header }
                    <main class="app-main">
                        <div class="error">{"No routes found. Check that public/routes.json is present."}</div>
                    </main>
                </div>
            };
        }

        let role = self.role;
        let access = Callback::from(move |action: TopoAction| role.allows(action));
        let route_name = self
            .route()
            .map(|r| r.name.clone())
            .unwrap_or_else(|| self.current_route.clone());

        html! {
            <div class="app-container">
                { header }
                <main class="app-main">
                    { self.render_selectors(ctx) }
                    <h2>{ route_name }</h2>
                    <section class="topo-section">
                        <TopoViewer
                            image_url={self.image_url.clone()}
                            field_value={self.field_value.clone()}
                            config={config.clone()}
                            access={access.clone()}
                            generation={self.generation}
                        />
                    </section>
                    {
                        if role.allows(TopoAction::Edit) {
                            html! {
                                <section class="topo-section">
                                    <h3>{"Edit topo"}</h3>
                                    <TopoEditor
                                        route_id={self.current_route.clone()}
                                        image_url={self.image_url.clone()}
                                        field_value={self.field_value.clone()}
                                        config={config}
                                        access={access}
                                        on_document_change={ctx.link().callback(AppMsg::DocumentChanged)}
                                        on_image_ingested={ctx.link().callback(AppMsg::ImageIngested)}
                                        generation={self.generation}
                                    />
                                </section>
                            }
                        } else {
                            html! {}
                        }
                    }
                    { self.render_offline(ctx) }
                    <form class="route-form" onsubmit={Callback::from(|e: SubmitEvent| e.prevent_default())}>
                        <input type="hidden" name="topo_data" value={self.field_value.clone()} />
                        <details>
                            <summary>{"Stored topo data"}</summary>
                            <pre class="field-dump">{ self.field_value.clone() }</pre>
                        </details>
                    </form>
                </main>
            </div>
        }
    }
}

impl App {
    fn render_selectors(&self, ctx: &Context<Self>) -> Html {
        let on_route = ctx.link().batch_callback(|e: Event| {
            e.target_dyn_into::<web_sys::HtmlSelectElement>()
                .map(|select| AppMsg::SelectRoute(select.value()))
        });
        let on_role = ctx.link().batch_callback(|e: Event| {
            e.target_dyn_into::<web_sys::HtmlSelectElement>()
                .map(|select| AppMsg::SetRole(Role::parse(&select.value())))
        });
        html! {
            <div class="selectors-container">
                <div class="route-selector">
                    <label for="route-select">{"Route: "}</label>
                    <select id="route-select" onchange={on_route}>
                        {for self.routes.iter().map(|route| html! {
                            <option value={route.id.clone()} selected={route.id == self.current_route}>
                                { route.name.clone() }
                            </option>
                        })}
                    </select>
                </div>
                <div class="role-selector">
                    <label for="role-select">{"Acting as: "}</label>
                    <select id="role-select" onchange={on_role}>
                        <option value="setter" selected={self.role == Role::Setter}>{"Route setter"}</option>
                        <option value="visitor" selected={self.role == Role::Visitor}>{"Visitor"}</option>
                    </select>
                </div>
            </div>
        }
    }

    fn render_offline(&self, ctx: &Context<Self>) -> Html {
        let status = match &self.offline_status {
            Some(status) => html! { <span class="offline-status">{ status.to_string() }</span> },
            None => html! {},
        };
        html! {
            <div class="offline-controls">
                <button onclick={ctx.link().callback(|_| AppMsg::SaveOffline)} disabled={self.saving}>
                    { if self.saving { "Saving…" } else { "Save for offline" } }
                </button>
                <button onclick={ctx.link().callback(|_| AppMsg::LoadOffline)}>{"Load offline copy"}</button>
                { status }
            </div>
        }
    }
}

async fn load_routes() -> Result<Vec<RouteRecord>, String> {
    let url = resource_url("public/routes.json");
    let resp = Request::get(&url)
        .send()
        .await
        .map_err(|e| format!("Failed to fetch {}: {:?}", url, e))?;
    if !resp.ok() {
        return Err(format!("{} returned HTTP {}", url, resp.status()));
    }
    let routes = resp
        .json::<Vec<RouteRecord>>()
        .await
        .map_err(|e| format!("Failed to parse {}: {:?}", url, e))?;
    log::info!("Loaded {} routes", routes.len());
    Ok(routes)
}

fn main() {
    wasm_logger::init(wasm_logger::Config::default());
    yew::Renderer::<App>::new().render();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visitors_can_only_view() {
        assert!(Role::Visitor.allows(TopoAction::View));
        assert!(!Role::Visitor.allows(TopoAction::Edit));
        assert!(Role::Setter.allows(TopoAction::Edit));
        assert_eq!(Role::parse("setter"), Role::Setter);
        assert_eq!(Role::parse("anything"), Role::Visitor);
    }

    #[test]
    fn test_route_field_values() {
        let raw = r#"[
            {"id": "1", "name": "Arete"},
            {"id": "2", "name": "Slab", "topo_url": "/t.jpg", "topo_data": null},
            {"id": "3", "name": "Roof", "topo_data": {"version": 1}}
        ]"#;
        let routes: Vec<RouteRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(routes[0].field_value(), ABSENT_FIELD);
        assert_eq!(routes[1].field_value(), ABSENT_FIELD);
        assert_eq!(routes[2].field_value(), r#"{"version":1}"#);
    }
}
